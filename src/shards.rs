//! Shard generation, holder-side decryption and public shard verification.

use std::collections::BTreeMap;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use curve25519_dalek::{RistrettoPoint, Scalar};
use hkdf::Hkdf;
use rand_core::{CryptoRng, RngCore};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::{EscrowConfig, MAX_SECRET_LEN};
use crate::crypto::feldman::FeldmanCommitments;
use crate::crypto::kem::{open_as_holder, seal_to_holder, EncapsulationSeed};
use crate::crypto::polynomial::Polynomial;
use crate::encoding::bytes_to_scalar;
use crate::error::{ConfigurationError, EscrowError};
use crate::holder::HolderKey;
use crate::types::{
    EscrowId, HolderId, HolderPublicKey, KeyShard, RawShare, ReleaseToken, SealedSecret, ShardingResult,
    VerificationData,
};

pub const DOMAIN_SECRET_HASH: &[u8] = b"mpc-escrow/secret-hash/v1";
pub const DOMAIN_SECRET_SEAL: &[u8] = b"mpc-escrow/secret-seal/v1";
pub const DOMAIN_SHARD_ID: &[u8] = b"mpc-escrow/shard-id/v1";

pub fn hash_secret(secret: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_SECRET_HASH);
    hasher.update(secret);
    hasher.finalize().into()
}

/// The seal key needs the escrow key and, for time-locked escrows, the
/// release token as well.
fn seal_key(
    escrow_key: &Scalar,
    release_token: Option<&ReleaseToken>,
    group_key: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, EscrowError> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(64));
    ikm.extend_from_slice(&escrow_key.to_bytes());
    if let Some(token) = release_token {
        ikm.extend_from_slice(token.as_bytes());
    }
    let hk = Hkdf::<Sha256>::new(Some(DOMAIN_SECRET_SEAL), ikm.as_slice());
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(group_key, &mut *key)
        .map_err(|e| EscrowError::Encoding(format!("hkdf expand: {}", e)))?;
    Ok(key)
}

fn seal_aad(secret_hash: &[u8; 32], group_key: &[u8; 32]) -> [u8; 64] {
    let mut aad = [0u8; 64];
    aad[..32].copy_from_slice(secret_hash);
    aad[32..].copy_from_slice(group_key);
    aad
}

fn seal_secret<R: RngCore + CryptoRng>(
    escrow_key: &Scalar,
    release_token: Option<&ReleaseToken>,
    group_key: &[u8; 32],
    secret_hash: &[u8; 32],
    secret: &[u8],
    rng: &mut R,
) -> Result<SealedSecret, EscrowError> {
    let key = seal_key(escrow_key, release_token, group_key)?;
    let mut nonce = [0u8; 24];
    rng.fill_bytes(&mut nonce);
    let aad = seal_aad(secret_hash, group_key);
    let ciphertext = XChaCha20Poly1305::new((&*key).into())
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: secret, aad: &aad })
        .map_err(|_| EscrowError::Encoding(String::from("secret sealing failed")))?;
    Ok(SealedSecret { nonce, ciphertext })
}

/// Opens the sealed secret with a candidate escrow key. A wrong key is an
/// integrity failure: it means the shares that produced it were bad.
///
/// Time-locked escrows also need the release token; without one this is
/// `TimeLockActive`. A token is ignored for escrows that carry no lock.
pub(crate) fn open_sealed_secret(
    escrow_key: &Scalar,
    verification_data: &VerificationData,
    release_token: Option<&ReleaseToken>,
) -> Result<Zeroizing<Vec<u8>>, EscrowError> {
    let release_token = match (verification_data.release_at, release_token) {
        (Some(release_at), None) => return Err(EscrowError::TimeLockActive { release_at }),
        (Some(_), token) => token,
        (None, _) => None,
    };
    let group_key = verification_data
        .group_public_key()
        .ok_or_else(|| EscrowError::InvalidShare(String::from("verification data has no commitments")))?;
    let key = seal_key(escrow_key, release_token, &group_key)?;
    let aad = seal_aad(&verification_data.secret_hash, &group_key);
    let sealed = &verification_data.sealed_secret;
    XChaCha20Poly1305::new((&*key).into())
        .decrypt(XNonce::from_slice(&sealed.nonce), Payload { msg: &sealed.ciphertext, aad: &aad })
        .map(Zeroizing::new)
        .map_err(|_| EscrowError::Integrity(String::from("reconstructed key does not open the sealed secret")))
}

/// Additional data binding a shard ciphertext to its public fields.
fn shard_aad(escrow_id: &EscrowId, index: u32, holder_id: &HolderId, commitment: &[u8; 32]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(16 + 4 + 32 + 32);
    aad.extend_from_slice(&escrow_id.0);
    aad.extend_from_slice(&index.to_le_bytes());
    aad.extend_from_slice(&holder_id.0);
    aad.extend_from_slice(commitment);
    aad
}

fn shard_id(encrypted_data: &[u8], ephemeral_public: &[u8; 32], nonce: &[u8; 24]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_SHARD_ID);
    hasher.update(ephemeral_public);
    hasher.update(nonce);
    hasher.update(encrypted_data);
    hasher.finalize().into()
}

pub(crate) fn check_preconditions(
    secret: &[u8],
    config: &EscrowConfig,
    holder_public_keys: &BTreeMap<HolderId, HolderPublicKey>,
) -> Result<(), ConfigurationError> {
    config.validate()?;
    if holder_public_keys.len() != config.total_shards as usize {
        return Err(ConfigurationError::HolderKeyCountMismatch {
            expected: config.total_shards as usize,
            actual: holder_public_keys.len(),
        });
    }
    if let Some((id, _)) = holder_public_keys
        .iter()
        .find(|(id, pk)| HolderId::from_public_key(pk) != **id)
    {
        return Err(ConfigurationError::HolderIdMismatch(*id));
    }
    if secret.is_empty() {
        return Err(ConfigurationError::EmptySecret);
    }
    if secret.len() > MAX_SECRET_LEN {
        return Err(ConfigurationError::SecretTooLong {
            len: secret.len(),
            max: MAX_SECRET_LEN,
        });
    }
    Ok(())
}

struct ShardJob {
    index: u32,
    holder_id: HolderId,
    public_key: HolderPublicKey,
    share: Zeroizing<[u8; 32]>,
    commitment: [u8; 32],
    seed: EncapsulationSeed,
}

/// Splits `secret` into `config.total_shards` encrypted shards, any
/// `config.threshold` of which recover it.
///
/// Holders are assigned indices `1..=n` in `HolderId` order. All
/// preconditions are checked before any randomness is drawn.
pub fn create_shards<R: RngCore + CryptoRng>(
    secret: &[u8],
    config: &EscrowConfig,
    holder_public_keys: &BTreeMap<HolderId, HolderPublicKey>,
    rng: &mut R,
) -> Result<ShardingResult, EscrowError> {
    share_secret(secret, config, holder_public_keys, None, rng)
}

/// Shared by plain and time-locked sharing. With `release`, the sealed
/// secret is bound to the token and `release_at` is published.
pub(crate) fn share_secret<R: RngCore + CryptoRng>(
    secret: &[u8],
    config: &EscrowConfig,
    holder_public_keys: &BTreeMap<HolderId, HolderPublicKey>,
    release: Option<(&ReleaseToken, u64)>,
    rng: &mut R,
) -> Result<ShardingResult, EscrowError> {
    check_preconditions(secret, config, holder_public_keys)?;

    let escrow_id = EscrowId::random(rng);
    let escrow_key = Zeroizing::new(Scalar::random(rng));
    let polynomial = Polynomial::random_with_constant(*escrow_key, config.threshold as usize, rng);
    let commitments = FeldmanCommitments::commit(&polynomial);
    let coefficient_commitments = commitments.to_compressed();
    let group_key = coefficient_commitments[0];

    let secret_hash = hash_secret(secret);
    let release_token = release.map(|(token, _)| token);
    let sealed_secret = seal_secret(&escrow_key, release_token, &group_key, &secret_hash, secret, rng)?;

    let jobs: Vec<ShardJob> = holder_public_keys
        .iter()
        .zip(polynomial.get_n_evals(config.total_shards as usize))
        .enumerate()
        .map(|(i, ((holder_id, public_key), share))| {
            let mut ephemeral_secret = Zeroizing::new([0u8; 32]);
            rng.fill_bytes(&mut *ephemeral_secret);
            let mut nonce = [0u8; 24];
            rng.fill_bytes(&mut nonce);
            ShardJob {
                index: i as u32 + 1,
                holder_id: *holder_id,
                public_key: *public_key,
                commitment: RistrettoPoint::mul_base(&share).compress().to_bytes(),
                share: Zeroizing::new(share.to_bytes()),
                seed: EncapsulationSeed {
                    ephemeral_secret,
                    nonce,
                },
            }
        })
        .collect();

    let shards = jobs
        .into_par_iter()
        .map(|job| {
            let aad = shard_aad(&escrow_id, job.index, &job.holder_id, &job.commitment);
            let (encapsulation, encrypted_data) = seal_to_holder(&job.public_key, job.seed, &aad, &*job.share)?;
            Ok(KeyShard {
                shard_id: shard_id(&encrypted_data, &encapsulation.ephemeral_public, &encapsulation.nonce),
                escrow_id,
                index: job.index,
                encrypted_data,
                encapsulation,
                commitment: job.commitment,
                holder_id: job.holder_id,
            })
        })
        .collect::<Result<Vec<_>, EscrowError>>()?;

    info!(
        escrow_id = %escrow_id,
        threshold = config.threshold,
        total_shards = config.total_shards,
        epoch = ?config.epoch,
        "Created escrow shards"
    );

    Ok(ShardingResult {
        shards,
        escrow_id,
        verification_data: VerificationData {
            coefficient_commitments,
            secret_hash,
            threshold: config.threshold,
            total_shards: config.total_shards,
            release_at: release.map(|(_, release_at)| release_at),
            sealed_secret,
        },
    })
}

/// Holder side: unwraps a shard with the holder's key.
///
/// # Errors
/// * `Decryption` if the shard was not encrypted for `holder`.
/// * `Integrity` if the ciphertext, its bound fields, or the decrypted share
///   do not match the shard's commitment.
pub fn decrypt_shard<K: HolderKey + ?Sized>(shard: &KeyShard, holder: &K) -> Result<RawShare, EscrowError> {
    let holder_id = holder.holder_id();
    if holder_id != shard.holder_id {
        return Err(EscrowError::Decryption(format!(
            "shard {} is addressed to holder {}, not {}",
            shard.index, shard.holder_id, holder_id
        )));
    }
    if shard.index == 0 {
        return Err(EscrowError::InvalidShare(String::from("shard index 0 is not an evaluation point")));
    }

    let aad = shard_aad(&shard.escrow_id, shard.index, &shard.holder_id, &shard.commitment);
    let plaintext = open_as_holder(holder, &shard.encapsulation, &aad, &shard.encrypted_data).map_err(|e| {
        if let EscrowError::Integrity(_) = e {
            warn!(escrow_id = %shard.escrow_id, index = shard.index, "Shard failed authentication");
        }
        e
    })?;

    let bytes: [u8; 32] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| EscrowError::Integrity(String::from("decrypted share has the wrong length")))?;
    let value = bytes_to_scalar(&bytes)
        .map_err(|_| EscrowError::Integrity(String::from("decrypted share is not a field element")))?;
    let raw = RawShare::new(shard.index, value);

    let recomputed = RistrettoPoint::mul_base(&raw.value).compress().to_bytes();
    if !bool::from(recomputed.ct_eq(&shard.commitment)) {
        warn!(escrow_id = %shard.escrow_id, index = shard.index, "Decrypted share does not match its commitment");
        return Err(EscrowError::Integrity(String::from(
            "decrypted share does not match the shard commitment",
        )));
    }
    Ok(raw)
}

/// Checks a shard's commitment against the public Feldman commitments,
/// without any secret key.
pub fn verify_shard(shard: &KeyShard, verification_data: &VerificationData) -> Result<(), EscrowError> {
    if shard.index == 0 || shard.index > verification_data.total_shards {
        return Err(EscrowError::InvalidShare(format!(
            "shard index {} outside 1..={}",
            shard.index, verification_data.total_shards
        )));
    }
    let commitments = FeldmanCommitments::from_compressed(&verification_data.coefficient_commitments)?;
    let expected = commitments.verification_share(shard.index).compress().to_bytes();
    if expected != shard.commitment {
        warn!(escrow_id = %shard.escrow_id, index = shard.index, "Shard commitment is inconsistent");
        return Err(EscrowError::Integrity(format!(
            "shard {} commitment is inconsistent with the verification data",
            shard.index
        )));
    }
    Ok(())
}
