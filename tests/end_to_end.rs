use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rand::thread_rng;
use tracing_subscriber::EnvFilter;

use mpc_escrow::encoding::WireFormat;
use mpc_escrow::registry::EscrowRegistry;
use mpc_escrow::types::{
    HolderId, HolderPublicKey, KeyShard, RawShare, SignatureShare, TimeLock, VerificationData,
};
use mpc_escrow::{
    decrypt_shard, reconstruct_released, solve_release_token, verify_shard, verify_threshold_signature, EngineSettings,
    EscrowConfig, EscrowEngine, EscrowError, HolderKey, SessionState, SoftwareHolderKey,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn holders(n: usize) -> (Vec<SoftwareHolderKey>, BTreeMap<HolderId, HolderPublicKey>) {
    let mut rng = thread_rng();
    let holders: Vec<SoftwareHolderKey> = (0..n).map(|_| SoftwareHolderKey::generate(&mut rng)).collect();
    let keys = holders.iter().map(|h| (h.holder_id(), h.public_key())).collect();
    (holders, keys)
}

/// Shards travel as bytes; each holder decodes and decrypts only its own.
fn holder_decrypts(bytes: &[u8], holder: &SoftwareHolderKey) -> RawShare {
    let shard = KeyShard::from_wire_bytes(bytes).unwrap();
    decrypt_shard(&shard, holder).unwrap()
}

#[test]
fn two_of_three_escrow_round_trip() {
    init_logging();
    let engine = EscrowEngine::new(EngineSettings::default(), Arc::new(EscrowRegistry::new())).unwrap();
    let (holders, keys) = holders(3);
    let secret: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
    let now = 1_760_000_000;

    let result = engine
        .create_escrow(&secret, &EscrowConfig::new(2, 3).with_epoch(1), &keys, now, &mut thread_rng())
        .unwrap();
    engine.mark_distributed(&result.escrow_id).unwrap();

    let vd_bytes = result.verification_data.to_wire_bytes().unwrap();
    let vd = VerificationData::from_wire_bytes(&vd_bytes).unwrap();
    for shard in &result.shards {
        verify_shard(shard, &vd).unwrap();
    }

    let by_index = |i: u32| {
        let shard = result.shard_at(i).unwrap();
        let holder = holders.iter().find(|h| h.holder_id() == shard.holder_id).unwrap();
        holder_decrypts(&shard.to_wire_bytes().unwrap(), holder)
    };

    let config = EscrowConfig::new(2, 3);
    let first = mpc_escrow::reconstruct(&[by_index(1), by_index(3)], &vd, &config).unwrap();
    let second = mpc_escrow::reconstruct(&[by_index(2), by_index(3)], &vd, &config).unwrap();
    assert_eq!(first.as_slice(), &secret);
    assert_eq!(first.as_slice(), second.as_slice());

    assert_eq!(
        mpc_escrow::reconstruct(&[by_index(2)], &vd, &config).unwrap_err(),
        EscrowError::InsufficientShares { got: 1, need: 2 }
    );

    let via_engine = engine
        .reconstruct(&result.escrow_id, &[by_index(3), by_index(1)], now)
        .unwrap();
    assert_eq!(via_engine.as_slice(), &secret);
}

#[test]
fn threshold_signature_round_trip() {
    init_logging();
    let engine = EscrowEngine::new(EngineSettings::default(), Arc::new(EscrowRegistry::new())).unwrap();
    let (holders, keys) = holders(5);
    let result = engine
        .create_escrow(b"treasury key", &EscrowConfig::new(3, 5), &keys, 0, &mut thread_rng())
        .unwrap();
    let message = b"pay 10 to alice";
    let session = engine
        .open_signing_session(&result.escrow_id, message, &mut thread_rng())
        .unwrap();

    for holder in holders.iter().rev().take(3) {
        let shard = result.shard_for(&holder.holder_id()).unwrap();
        let share = EscrowEngine::holder_signature_share(shard, holder, message, &mut thread_rng()).unwrap();
        let share = SignatureShare::from_wire_bytes(&share.to_wire_bytes().unwrap()).unwrap();
        engine.submit_signature_share(&session, share.clone()).unwrap();
        assert_eq!(
            engine.submit_signature_share(&session, share).unwrap_err(),
            EscrowError::DuplicateContribution(holder.holder_id())
        );
    }
    assert_eq!(engine.session_state(&session).unwrap(), SessionState::Combinable);

    let signature = engine.combine_signatures(&session, message, 3).unwrap();
    verify_threshold_signature(&result.verification_data, message, &signature).unwrap();
    assert_eq!(
        engine.combine_signatures(&session, message, 3).unwrap_err(),
        EscrowError::SessionClosed(session)
    );
}

#[test]
fn time_locked_escrow_opens_offline_with_token_and_shares() {
    init_logging();
    let settings = EngineSettings {
        puzzle_steps_per_second: 5,
        ..EngineSettings::default()
    };
    let engine = EscrowEngine::new(settings, Arc::new(EscrowRegistry::new())).unwrap();
    let (holders, keys) = holders(3);
    let now = 1_760_000_000;
    let config = EscrowConfig::new(2, 3).with_time_lock_until(now + 120);
    let result = engine
        .create_escrow(b"inheritance", &config, &keys, now, &mut thread_rng())
        .unwrap();

    let lock_bytes = engine.time_lock(&result.escrow_id).unwrap().unwrap().to_wire_bytes().unwrap();
    let lock = TimeLock::from_wire_bytes(&lock_bytes).unwrap();
    let vd = VerificationData::from_wire_bytes(&result.verification_data.to_wire_bytes().unwrap()).unwrap();
    assert_eq!(vd.release_at, Some(now + 120));

    let token = solve_release_token(&lock, &AtomicBool::new(false)).unwrap();
    let raw: Vec<RawShare> = holders
        .iter()
        .take(2)
        .map(|h| holder_decrypts(&result.shard_for(&h.holder_id()).unwrap().to_wire_bytes().unwrap(), h))
        .collect();

    assert_eq!(
        reconstruct_released(&raw[..1], &vd, &config, &token).unwrap_err(),
        EscrowError::InsufficientShares { got: 1, need: 2 }
    );
    assert_eq!(
        reconstruct_released(&raw, &vd, &config, &token).unwrap().as_slice(),
        b"inheritance"
    );
    assert_eq!(
        engine.reconstruct(&result.escrow_id, &raw, now).unwrap_err(),
        EscrowError::TimeLockActive { release_at: now + 120 }
    );
}
