//! Time-locks over a Sloth puzzle.
//!
//! [`create_time_lock`] seals arbitrary bytes under a key derived from the
//! output of a Sloth puzzle (see [`crate::crypto::sloth`]). Before
//! `release_at` the only way to the key is to run `puzzle_difficulty`
//! sequential square roots; once the release time has passed the lock is
//! simply reported as expired.
//!
//! Escrows never lock the secret itself. [`create_time_locked_shards`]
//! locks a random [`ReleaseToken`] and binds the sealed secret to both the
//! token and the escrow key, so opening the lock lowers nothing: the
//! threshold of shares is still required.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::Rng;
use rand_core::CryptoRng;
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::EscrowConfig;
use crate::crypto::sloth;
use crate::error::{ConfigurationError, EscrowError};
use crate::shards::{check_preconditions, share_secret};
use crate::types::{HolderId, HolderPublicKey, ReleaseToken, ShardingResult, TimeLock, TimeLockedKey};

pub const DOMAIN_TIME_LOCK_KEY: &[u8] = b"mpc-escrow/time-lock-key/v1";

fn lock_key(puzzle_output: &[u8; 32], puzzle_start: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, EscrowError> {
    let hk = Hkdf::<Sha256>::new(Some(DOMAIN_TIME_LOCK_KEY), puzzle_output);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(puzzle_start, &mut *key)
        .map_err(|e| EscrowError::Encoding(format!("hkdf expand: {}", e)))?;
    Ok(key)
}

fn lock_aad(release_at: u64, puzzle_difficulty: u64) -> [u8; 16] {
    let mut aad = [0u8; 16];
    aad[..8].copy_from_slice(&release_at.to_le_bytes());
    aad[8..].copy_from_slice(&puzzle_difficulty.to_le_bytes());
    aad
}

/// Seals `secret` behind a puzzle of `puzzle_difficulty` sequential steps.
///
/// Creation costs `puzzle_difficulty` squarings, far less than solving. A
/// `release_at` in the past is accepted and yields an already expired lock.
pub fn create_time_lock<R: Rng + CryptoRng>(
    secret: &[u8],
    release_at: u64,
    puzzle_difficulty: u64,
    rng: &mut R,
) -> Result<TimeLock, EscrowError> {
    if puzzle_difficulty == 0 {
        return Err(ConfigurationError::ZeroPuzzleDifficulty.into());
    }
    if secret.is_empty() {
        return Err(ConfigurationError::EmptySecret.into());
    }

    let output = sloth::random_element(rng);
    let start = sloth::unwind(&output, puzzle_difficulty);
    let output_bytes = Zeroizing::new(sloth::element_to_bytes(&output)?);
    let puzzle_start = sloth::element_to_bytes(&start)?;

    let key = lock_key(&output_bytes, &puzzle_start)?;
    let mut nonce = [0u8; 24];
    rng.fill(&mut nonce);
    let aad = lock_aad(release_at, puzzle_difficulty);
    let ciphertext = XChaCha20Poly1305::new((&*key).into())
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: secret, aad: &aad })
        .map_err(|_| EscrowError::Encoding(String::from("time-lock sealing failed")))?;

    info!(release_at, puzzle_difficulty, "Created time lock");

    Ok(TimeLock {
        release_at,
        puzzle_difficulty,
        time_locked_key: TimeLockedKey {
            puzzle_start,
            nonce,
            ciphertext,
        },
    })
}

/// Pure clock comparison; never touches the puzzle.
pub fn is_time_lock_expired(lock: &TimeLock, now: u64) -> bool {
    now >= lock.release_at
}

/// Forces the lock open by running the puzzle to completion.
///
/// Runs for roughly `puzzle_difficulty / steps_per_second` and can be
/// aborted through `cancel`, in which case `EscrowError::Cancelled` is
/// returned and nothing is decrypted.
pub fn solve_time_lock(lock: &TimeLock, cancel: &AtomicBool) -> Result<Zeroizing<Vec<u8>>, EscrowError> {
    if lock.puzzle_difficulty == 0 {
        return Err(ConfigurationError::ZeroPuzzleDifficulty.into());
    }
    let sealed = &lock.time_locked_key;
    let start = sloth::element_from_bytes(&sealed.puzzle_start)?;

    debug!(puzzle_difficulty = lock.puzzle_difficulty, "Solving time-lock puzzle");
    let output = sloth::wind(&start, lock.puzzle_difficulty, cancel)?;
    let output_bytes = Zeroizing::new(sloth::element_to_bytes(&output)?);

    let key = lock_key(&output_bytes, &sealed.puzzle_start)?;
    let aad = lock_aad(lock.release_at, lock.puzzle_difficulty);
    XChaCha20Poly1305::new((&*key).into())
        .decrypt(
            XNonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad: &aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| {
            warn!(release_at = lock.release_at, "Time-lock ciphertext failed authentication");
            EscrowError::Integrity(String::from("time-locked key failed authentication"))
        })
}

/// Output of [`create_time_locked_shards`]. `release_token` is what the
/// lock protects; whoever keeps it can release the escrow at `release_at`
/// without solving the puzzle.
#[derive(Debug)]
pub struct TimeLockedShards {
    pub sharding: ShardingResult,
    pub time_lock: TimeLock,
    pub release_token: ReleaseToken,
}

/// Shards `secret` like [`crate::shards::create_shards`] and additionally
/// gates it behind a time-lock.
///
/// Recovery needs `threshold` shares and the release token, which comes
/// either from `release_token` after `release_at` or from solving
/// `time_lock`.
pub fn create_time_locked_shards<R: Rng + CryptoRng>(
    secret: &[u8],
    config: &EscrowConfig,
    holder_public_keys: &BTreeMap<HolderId, HolderPublicKey>,
    release_at: u64,
    puzzle_difficulty: u64,
    rng: &mut R,
) -> Result<TimeLockedShards, EscrowError> {
    check_preconditions(secret, config, holder_public_keys)?;
    if puzzle_difficulty == 0 {
        return Err(ConfigurationError::ZeroPuzzleDifficulty.into());
    }

    let release_token = ReleaseToken::random(rng);
    let sharding = share_secret(
        secret,
        config,
        holder_public_keys,
        Some((&release_token, release_at)),
        rng,
    )?;
    let time_lock = create_time_lock(release_token.as_bytes(), release_at, puzzle_difficulty, rng)?;
    Ok(TimeLockedShards {
        sharding,
        time_lock,
        release_token,
    })
}

/// Solves an escrow's lock for its release token. Same cost and
/// cancellation as [`solve_time_lock`].
pub fn solve_release_token(lock: &TimeLock, cancel: &AtomicBool) -> Result<ReleaseToken, EscrowError> {
    let opened = solve_time_lock(lock, cancel)?;
    ReleaseToken::from_bytes(&opened)
}
