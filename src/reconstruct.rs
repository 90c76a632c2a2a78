//! Secret recovery from decrypted shares.

use std::collections::BTreeSet;

use curve25519_dalek::Scalar;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::EscrowConfig;
use crate::crypto::feldman::FeldmanCommitments;
use crate::crypto::interpolate::interpolate_scalar;
use crate::error::{ConfigurationError, EscrowError};
use crate::shards::{hash_secret, open_sealed_secret};
use crate::types::{RawShare, ReleaseToken, VerificationData};

/// Recovers the escrowed secret from at least `threshold` distinct shares.
///
/// The result is returned only after its hash matches
/// `verification_data.secret_hash`; a wrong or tampered share surfaces as
/// `EscrowError::Integrity`, never as a wrong secret. Time-locked escrows
/// are refused with `TimeLockActive`; see [`reconstruct_released`].
pub fn reconstruct(
    shares: &[RawShare],
    verification_data: &VerificationData,
    config: &EscrowConfig,
) -> Result<Zeroizing<Vec<u8>>, EscrowError> {
    recover(shares, verification_data, config, None)
}

/// Reconstruction of a time-locked escrow once its [`ReleaseToken`] is
/// known, either from the escrow's custodian after `release_at` or by
/// solving the lock with [`crate::timelock::solve_release_token`]. The token
/// does not lower the threshold. A wrong token is `Integrity`.
pub fn reconstruct_released(
    shares: &[RawShare],
    verification_data: &VerificationData,
    config: &EscrowConfig,
    release_token: &ReleaseToken,
) -> Result<Zeroizing<Vec<u8>>, EscrowError> {
    recover(shares, verification_data, config, Some(release_token))
}

fn recover(
    shares: &[RawShare],
    verification_data: &VerificationData,
    config: &EscrowConfig,
    release_token: Option<&ReleaseToken>,
) -> Result<Zeroizing<Vec<u8>>, EscrowError> {
    let need = verification_data.threshold as usize;
    if shares.len() < need {
        return Err(EscrowError::InsufficientShares {
            got: shares.len(),
            need,
        });
    }
    if config.threshold != verification_data.threshold {
        return Err(ConfigurationError::ThresholdMismatch {
            config: config.threshold,
            verification: verification_data.threshold,
        }
        .into());
    }

    let mut seen = BTreeSet::new();
    for share in shares {
        if share.index == 0 || share.index > verification_data.total_shards {
            return Err(EscrowError::InvalidShare(format!(
                "share index {} outside 1..={}",
                share.index, verification_data.total_shards
            )));
        }
        if !seen.insert(share.index) {
            return Err(EscrowError::InvalidShare(format!("duplicate share index {}", share.index)));
        }
    }

    let samples: Vec<(Scalar, Scalar)> = shares
        .iter()
        .map(|s| (Scalar::from(s.index as u64), s.value))
        .collect();
    let escrow_key = Zeroizing::new(
        interpolate_scalar(&samples).map_err(|_| EscrowError::InvalidShare(String::from("duplicate share index")))?,
    );

    let secret = open_sealed_secret(&escrow_key, verification_data, release_token).map_err(|e| {
        if matches!(e, EscrowError::Integrity(_)) {
            warn!(indices = ?seen, "Reconstructed key failed verification");
        }
        e
    })?;

    let digest = hash_secret(&secret);
    if !bool::from(digest.ct_eq(&verification_data.secret_hash)) {
        warn!(indices = ?seen, "Reconstructed secret does not match its hash");
        return Err(EscrowError::Integrity(String::from(
            "reconstructed secret does not match the secret hash",
        )));
    }

    info!(shares = shares.len(), threshold = need, "Reconstructed escrowed secret");
    Ok(secret)
}

/// Indices of the shares that are inconsistent with the public commitments.
/// Useful to find the culprit after `reconstruct` reports an integrity
/// failure.
pub fn identify_invalid_shares(
    shares: &[RawShare],
    verification_data: &VerificationData,
) -> Result<Vec<u32>, EscrowError> {
    let commitments = FeldmanCommitments::from_compressed(&verification_data.coefficient_commitments)?;
    Ok(shares
        .iter()
        .filter(|s| s.index == 0 || !commitments.verify_share(s.index, &s.value))
        .map(|s| s.index)
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::seq::SliceRandom;
    use rand::thread_rng;

    use super::*;
    use crate::holder::{HolderKey, SoftwareHolderKey};
    use crate::shards::{create_shards, decrypt_shard};
    use crate::types::{HolderId, HolderPublicKey};

    fn escrow(secret: &[u8], k: u32, n: u32) -> (Vec<RawShare>, VerificationData, EscrowConfig) {
        let mut rng = thread_rng();
        let holders: Vec<SoftwareHolderKey> = (0..n).map(|_| SoftwareHolderKey::generate(&mut rng)).collect();
        let keys: BTreeMap<HolderId, HolderPublicKey> =
            holders.iter().map(|h| (h.holder_id(), h.public_key())).collect();
        let config = EscrowConfig::new(k, n);
        let result = create_shards(secret, &config, &keys, &mut rng).unwrap();
        let mut raw: Vec<RawShare> = holders
            .iter()
            .map(|h| decrypt_shard(result.shard_for(&h.holder_id()).unwrap(), h).unwrap())
            .collect();
        raw.sort_by_key(|s| s.index);
        (raw, result.verification_data, config)
    }

    fn subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
        if k == 0 {
            return vec![vec![]];
        }
        if n < k {
            return vec![];
        }
        let mut with_last: Vec<Vec<usize>> = subsets(n - 1, k - 1)
            .into_iter()
            .map(|mut s| {
                s.push(n - 1);
                s
            })
            .collect();
        with_last.extend(subsets(n - 1, k));
        with_last
    }

    #[test]
    fn every_k_subset_reconstructs() {
        let mut rng = thread_rng();
        for n in 2..=7u32 {
            for k in 2..=n {
                let secret: Vec<u8> = (0..(k * n) as u8).collect();
                let (raw, vd, config) = escrow(&secret, k, n);
                for subset in subsets(n as usize, k as usize) {
                    let mut picked: Vec<RawShare> = subset.iter().map(|i| raw[*i].clone()).collect();
                    picked.shuffle(&mut rng);
                    let recovered = reconstruct(&picked, &vd, &config).unwrap();
                    assert_eq!(recovered.as_slice(), secret.as_slice(), "k={} n={} {:?}", k, n, subset);
                }
            }
        }
    }

    #[test]
    fn too_few_shares_is_insufficient() {
        let (raw, vd, config) = escrow(b"short", 3, 5);
        assert_eq!(
            reconstruct(&raw[..2], &vd, &config).unwrap_err(),
            EscrowError::InsufficientShares { got: 2, need: 3 }
        );
        assert_eq!(
            reconstruct(&[], &vd, &config).unwrap_err(),
            EscrowError::InsufficientShares { got: 0, need: 3 }
        );
    }

    #[test]
    fn duplicate_and_out_of_range_indices_are_invalid() {
        let (raw, vd, config) = escrow(b"short", 2, 3);
        let dup = vec![raw[0].clone(), raw[0].clone()];
        assert!(matches!(reconstruct(&dup, &vd, &config), Err(EscrowError::InvalidShare(_))));

        let out_of_range = vec![raw[0].clone(), RawShare::new(9, raw[1].value)];
        assert!(matches!(
            reconstruct(&out_of_range, &vd, &config),
            Err(EscrowError::InvalidShare(_))
        ));
    }

    #[test]
    fn mismatched_config_is_rejected() {
        let (raw, vd, _) = escrow(b"short", 2, 3);
        assert!(matches!(
            reconstruct(&raw, &vd, &EscrowConfig::new(3, 3)),
            Err(EscrowError::Configuration(ConfigurationError::ThresholdMismatch { .. }))
        ));
    }

    #[test]
    fn corrupted_share_is_an_integrity_error() {
        let (mut raw, vd, config) = escrow(b"short", 2, 3);
        raw[1] = RawShare::new(raw[1].index, raw[1].value + Scalar::ONE);
        assert!(matches!(
            reconstruct(&raw[..2], &vd, &config),
            Err(EscrowError::Integrity(_))
        ));
        assert_eq!(identify_invalid_shares(&raw, &vd).unwrap(), vec![raw[1].index]);
    }
}
