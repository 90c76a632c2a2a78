//! Core type definitions shared by the escrow engine.
//!
//! Everything here except [`RawShare`] is public material that may travel
//! between devices; see [`crate::encoding::WireFormat`] for the byte encoding.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::nizk_dleq::DleqProof;
use crate::error::EscrowError;

pub const DOMAIN_HOLDER_ID: &[u8] = b"mpc-escrow/holder-id/v1";

// =========================
// IDENTIFIERS
// =========================

/// Opaque holder identifier, the hash of the holder's long-term public key.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct HolderId(pub [u8; 32]);

impl HolderId {
    pub fn from_public_key(public_key: &HolderPublicKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_HOLDER_ID);
        hasher.update(public_key.0);
        HolderId(hasher.finalize().into())
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HolderId({})", hex::encode(self.0))
    }
}

/// X25519 public encapsulation key of a holder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct HolderPublicKey(pub [u8; 32]);

macro_rules! random_id {
    ($name:ident) => {
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
        )]
        pub struct $name(pub [u8; 16]);

        impl $name {
            pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
                let mut bytes = [0u8; 16];
                rng.fill_bytes(&mut bytes);
                $name(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }
    };
}

random_id!(EscrowId);
random_id!(SessionId);

// =========================
// SHARDING
// =========================

/// Key-encapsulation material attached to each encrypted shard.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Encapsulation {
    /// Ephemeral X25519 public key of the sender.
    pub ephemeral_public: [u8; 32],
    /// HKDF output that lets the holder confirm it derived the same key.
    pub key_confirmation: [u8; 32],
    pub nonce: [u8; 24],
}

/// A shard encrypted for exactly one holder.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct KeyShard {
    /// Content identifier, independent of `index`.
    pub shard_id: [u8; 32],
    pub escrow_id: EscrowId,
    /// Evaluation point of the sharing polynomial, 1-based.
    pub index: u32,
    pub encrypted_data: Vec<u8>,
    pub encapsulation: Encapsulation,
    /// Compressed `y_i * G`, the holder's public verification share.
    pub commitment: [u8; 32],
    pub holder_id: HolderId,
}

/// Secret bytes sealed under a key derived from the escrow key.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SealedSecret {
    pub nonce: [u8; 24],
    pub ciphertext: Vec<u8>,
}

/// Public verification data, safe to broadcast.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct VerificationData {
    /// Feldman commitments `a_j * G`, constant term first.
    pub coefficient_commitments: Vec<[u8; 32]>,
    pub secret_hash: [u8; 32],
    pub threshold: u32,
    pub total_shards: u32,
    /// Set for time-locked escrows: the sealed secret then also needs the
    /// release token held by the escrow's [`TimeLock`].
    pub release_at: Option<u64>,
    pub sealed_secret: SealedSecret,
}

impl VerificationData {
    /// The commitment to the escrow key, which doubles as the public key
    /// that threshold signatures verify against.
    pub fn group_public_key(&self) -> Option<[u8; 32]> {
        self.coefficient_commitments.first().copied()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingResult {
    pub shards: Vec<KeyShard>,
    pub escrow_id: EscrowId,
    pub verification_data: VerificationData,
}

impl ShardingResult {
    pub fn shard_for(&self, holder_id: &HolderId) -> Option<&KeyShard> {
        self.shards.iter().find(|s| &s.holder_id == holder_id)
    }

    pub fn shard_at(&self, index: u32) -> Option<&KeyShard> {
        self.shards.iter().find(|s| s.index == index)
    }
}

/// A decrypted share. Wiped from memory on drop and never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RawShare {
    pub index: u32,
    pub value: Scalar,
}

impl RawShare {
    pub fn new(index: u32, value: Scalar) -> Self {
        RawShare { index, value }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.value.to_bytes()
    }
}

impl fmt::Debug for RawShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawShare")
            .field("index", &self.index)
            .field("value", &"<redacted>")
            .finish()
    }
}

// =========================
// TIME-LOCK
// =========================

/// Random key share released by a time-locked escrow's puzzle. On its own it
/// opens nothing; reconstruction still needs `threshold` shares.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ReleaseToken([u8; 32]);

impl ReleaseToken {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        ReleaseToken(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EscrowError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EscrowError::Integrity(format!("release token of {} bytes", bytes.len())))?;
        Ok(ReleaseToken(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ReleaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReleaseToken(<redacted>)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TimeLockedKey {
    /// Puzzle input; the opener walks `puzzle_difficulty` square roots from here.
    pub puzzle_start: [u8; 32],
    pub nonce: [u8; 24],
    pub ciphertext: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TimeLock {
    /// Unix seconds.
    pub release_at: u64,
    pub puzzle_difficulty: u64,
    pub time_locked_key: TimeLockedKey,
}

// =========================
// THRESHOLD SIGNING
// =========================

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SignatureShare {
    pub holder_id: HolderId,
    pub index: u32,
    /// Compressed `y_i * H(message)`.
    pub partial_signature: [u8; 32],
    pub proof: DleqProof,
}

/// Combined signature `a_0 * H(message)` together with the signer shares it
/// was interpolated from, ordered by index.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ThresholdSignature {
    pub signature: [u8; 32],
    pub signers: Vec<SignatureShare>,
}

// =========================
// ORCHESTRATION
// =========================

#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum EscrowStatus {
    Created,
    ShardsDistributed,
    ReconstructionPending,
    Reconstructed,
    TimeLocked,
    Expired,
}
