//! Threshold signatures over the escrow key.
//!
//! Unique (BLS-style) signatures on Ristretto: the message is hashed to a
//! point `H`, holder `i` contributes `sigma_i = y_i * H` together with a
//! Chaum-Pedersen proof that `sigma_i` and the public verification share
//! `Y_i = y_i * G` use the same exponent. Any `threshold` accepted partials
//! interpolate to `a_0 * H`, the signature under the group public key
//! `C_0 = a_0 * G`.

use std::collections::{BTreeMap, BTreeSet};

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::traits::MultiscalarMul;
use curve25519_dalek::RistrettoPoint;
use rand_core::{CryptoRng, RngCore};
use rayon::prelude::*;
use sha2::Sha512;
use tracing::{debug, info, warn};

use crate::crypto::feldman::FeldmanCommitments;
use crate::crypto::interpolate::lagrange_coefficients_for_indices;
use crate::crypto::nizk_dleq::{prove_nizk_dleq, verify_nizk_dleq, ZkInstanceDleq, ZkWitnessDleq};
use crate::encoding::bytes_to_ristretto_point;
use crate::error::{ConfigurationError, EscrowError};
use crate::types::{EscrowId, HolderId, RawShare, SessionId, SignatureShare, ThresholdSignature, VerificationData};

pub const DOMAIN_MESSAGE_HASH: &[u8] = b"mpc-escrow/threshold-signature/v1";

pub fn hash_message_to_point(message: &[u8]) -> RistrettoPoint {
    let mut input = Vec::with_capacity(DOMAIN_MESSAGE_HASH.len() + message.len());
    input.extend_from_slice(DOMAIN_MESSAGE_HASH);
    input.extend_from_slice(message);
    RistrettoPoint::hash_from_bytes::<Sha512>(&input)
}

/// Holder side: signs `message` with one decrypted share. Needs neither the
/// full key nor any other holder.
pub fn create_signature_share<R: RngCore + CryptoRng>(
    holder_id: HolderId,
    raw_share: &RawShare,
    message: &[u8],
    rng: &mut R,
) -> Result<SignatureShare, EscrowError> {
    let h = hash_message_to_point(message);
    let partial = h * raw_share.value;
    let instance = ZkInstanceDleq {
        g: RISTRETTO_BASEPOINT_POINT,
        h,
        public_share: RistrettoPoint::mul_base(&raw_share.value),
        partial,
    };
    let witness = ZkWitnessDleq {
        share: raw_share.value,
    };
    let proof = prove_nizk_dleq(&instance, &witness, rng)
        .map_err(|e| EscrowError::InvalidShare(format!("cannot prove signature share: {}", e)))?;

    Ok(SignatureShare {
        holder_id,
        index: raw_share.index,
        partial_signature: partial.compress().to_bytes(),
        proof,
    })
}

/// Checks one partial signature against the public commitments.
fn verify_share_proof(
    commitments: &FeldmanCommitments,
    h: &RistrettoPoint,
    share: &SignatureShare,
) -> Result<RistrettoPoint, EscrowError> {
    let partial = bytes_to_ristretto_point(&share.partial_signature)
        .map_err(|_| EscrowError::InvalidShare(String::from("partial signature is not a group element")))?;
    let instance = ZkInstanceDleq {
        g: RISTRETTO_BASEPOINT_POINT,
        h: *h,
        public_share: commitments.verification_share(share.index),
        partial,
    };
    verify_nizk_dleq(&instance, &share.proof).map_err(|_| EscrowError::InvalidProof(share.holder_id))?;
    Ok(partial)
}

/// `sum_i lambda_i * sigma_i` over shares sorted by index.
fn combine_partials(signers: &[(u32, RistrettoPoint)]) -> Result<RistrettoPoint, EscrowError> {
    let indices: Vec<u32> = signers.iter().map(|(i, _)| *i).collect();
    let lambdas = lagrange_coefficients_for_indices(&indices)
        .map_err(|_| EscrowError::InvalidShare(String::from("duplicate signer index")))?;
    Ok(RistrettoPoint::multiscalar_mul(
        lambdas.iter(),
        signers.iter().map(|(_, p)| p),
    ))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Collecting,
    Combinable,
    Combined,
}

/// Collects signature shares for one message and combines them once.
///
/// Callers serialize access per session (see
/// [`crate::registry::SessionRegistry`]) so that the duplicate and threshold
/// checks are atomic with respect to concurrent submissions.
pub struct SigningSession {
    session_id: SessionId,
    escrow_id: EscrowId,
    message: Vec<u8>,
    message_point: RistrettoPoint,
    escrow_threshold: usize,
    commitments: FeldmanCommitments,
    roster: BTreeMap<HolderId, u32>,
    accepted: BTreeMap<HolderId, SignatureShare>,
    combined: Option<ThresholdSignature>,
}

impl SigningSession {
    /// `roster` maps each holder to the shard index it was given.
    pub fn new(
        session_id: SessionId,
        escrow_id: EscrowId,
        verification_data: &VerificationData,
        roster: BTreeMap<HolderId, u32>,
        message: &[u8],
    ) -> Result<Self, EscrowError> {
        let mut indices = BTreeSet::new();
        for (holder_id, index) in &roster {
            if *index == 0 || *index > verification_data.total_shards || !indices.insert(*index) {
                return Err(EscrowError::InvalidShare(format!(
                    "roster assigns invalid index {} to holder {}",
                    index, holder_id
                )));
            }
        }
        Ok(SigningSession {
            session_id,
            escrow_id,
            message: message.to_vec(),
            message_point: hash_message_to_point(message),
            escrow_threshold: verification_data.threshold as usize,
            commitments: FeldmanCommitments::from_compressed(&verification_data.coefficient_commitments)?,
            roster,
            accepted: BTreeMap::new(),
            combined: None,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn state(&self) -> SessionState {
        if self.combined.is_some() {
            SessionState::Combined
        } else if self.accepted.is_empty() {
            SessionState::Empty
        } else if self.accepted.len() >= self.escrow_threshold {
            SessionState::Combinable
        } else {
            SessionState::Collecting
        }
    }

    /// Accepts a verified share.
    ///
    /// # Errors
    /// * `SessionClosed` once a signature has been produced.
    /// * `DuplicateContribution` if the holder already has an accepted share.
    /// * `InvalidShare` if the holder or its index is not on the roster.
    /// * `InvalidProof` if the partial signature does not match the holder's
    ///   verification share.
    pub fn submit(&mut self, share: SignatureShare) -> Result<SessionState, EscrowError> {
        if self.combined.is_some() {
            return Err(EscrowError::SessionClosed(self.session_id));
        }
        if self.accepted.contains_key(&share.holder_id) {
            warn!(session_id = %self.session_id, holder_id = %share.holder_id, "Duplicate signature share");
            return Err(EscrowError::DuplicateContribution(share.holder_id));
        }
        match self.roster.get(&share.holder_id) {
            Some(index) if *index == share.index => {}
            Some(index) => {
                return Err(EscrowError::InvalidShare(format!(
                    "holder {} signs with index {}, expected {}",
                    share.holder_id, share.index, index
                )))
            }
            None => {
                return Err(EscrowError::InvalidShare(format!(
                    "holder {} is not part of escrow {}",
                    share.holder_id, self.escrow_id
                )))
            }
        }
        if let Err(e) = verify_share_proof(&self.commitments, &self.message_point, &share) {
            warn!(session_id = %self.session_id, holder_id = %share.holder_id, "Rejected signature share: {}", e);
            return Err(e);
        }

        debug!(session_id = %self.session_id, holder_id = %share.holder_id, index = share.index, "Accepted signature share");
        self.accepted.insert(share.holder_id, share);
        Ok(self.state())
    }

    /// Combines every accepted share into the group signature. The output
    /// depends only on the accepted set, never on submission order.
    pub fn combine(&mut self, message: &[u8], threshold: usize) -> Result<ThresholdSignature, EscrowError> {
        if self.combined.is_some() {
            return Err(EscrowError::SessionClosed(self.session_id));
        }
        if message != self.message.as_slice() {
            return Err(EscrowError::MessageMismatch);
        }
        if threshold < self.escrow_threshold {
            return Err(ConfigurationError::SignatureThresholdTooLow {
                requested: threshold,
                escrow: self.escrow_threshold,
            }
            .into());
        }
        if self.accepted.len() < threshold {
            return Err(EscrowError::InsufficientShares {
                got: self.accepted.len(),
                need: threshold,
            });
        }

        let mut signers: Vec<SignatureShare> = self.accepted.values().cloned().collect();
        signers.sort_by_key(|s| s.index);
        let partials = signers
            .iter()
            .map(|s| Ok((s.index, bytes_to_ristretto_point(&s.partial_signature)?)))
            .collect::<Result<Vec<_>, EscrowError>>()?;
        let signature = combine_partials(&partials)?;

        let result = ThresholdSignature {
            signature: signature.compress().to_bytes(),
            signers,
        };
        info!(session_id = %self.session_id, escrow_id = %self.escrow_id, signers = result.signers.len(), "Combined threshold signature");
        self.combined = Some(result.clone());
        Ok(result)
    }
}

/// Verifies a combined signature from public data alone: every signer proof
/// is re-checked and the Lagrange combination recomputed.
pub fn verify_threshold_signature(
    verification_data: &VerificationData,
    message: &[u8],
    signature: &ThresholdSignature,
) -> Result<(), EscrowError> {
    let need = verification_data.threshold as usize;
    if signature.signers.len() < need {
        return Err(EscrowError::InsufficientShares {
            got: signature.signers.len(),
            need,
        });
    }
    let mut indices = BTreeSet::new();
    for signer in &signature.signers {
        if signer.index == 0 || signer.index > verification_data.total_shards || !indices.insert(signer.index) {
            return Err(EscrowError::InvalidShare(format!("invalid signer index {}", signer.index)));
        }
    }

    let commitments = FeldmanCommitments::from_compressed(&verification_data.coefficient_commitments)?;
    let h = hash_message_to_point(message);
    let partials = signature
        .signers
        .par_iter()
        .map(|s| Ok((s.index, verify_share_proof(&commitments, &h, s)?)))
        .collect::<Result<Vec<_>, EscrowError>>()?;

    let expected = combine_partials(&partials)?;
    if expected.compress().to_bytes() != signature.signature {
        warn!("Threshold signature does not match its signer shares");
        return Err(EscrowError::Integrity(String::from(
            "signature is not the combination of its signer shares",
        )));
    }
    Ok(())
}
