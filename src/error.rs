use thiserror::Error;

use crate::types::{EscrowId, HolderId, SessionId};

/// Caller mistakes detected before any randomness is drawn or any
/// cryptographic material is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("threshold {threshold} is below the minimum of {min}")]
    ThresholdTooLow { threshold: u32, min: u32 },
    #[error("total shards {total} exceeds the maximum of {max}")]
    TooManyShards { total: u32, max: u32 },
    #[error("threshold {threshold} exceeds total shards {total}")]
    ThresholdExceedsShards { threshold: u32, total: u32 },
    #[error("expected {expected} holder public keys, got {actual}")]
    HolderKeyCountMismatch { expected: usize, actual: usize },
    #[error("holder id {0} does not match the hash of its public key")]
    HolderIdMismatch(HolderId),
    #[error("secret is empty")]
    EmptySecret,
    #[error("secret of {len} bytes exceeds the maximum of {max}")]
    SecretTooLong { len: usize, max: usize },
    #[error("config threshold {config} does not match verification threshold {verification}")]
    ThresholdMismatch { config: u32, verification: u32 },
    #[error("signature threshold {requested} is below the escrow threshold {escrow}")]
    SignatureThresholdTooLow { requested: usize, escrow: usize },
    #[error("puzzle difficulty must be at least 1")]
    ZeroPuzzleDifficulty,
    #[error("invalid engine settings: {0}")]
    InvalidSettings(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("insufficient shares: got {got}, need {need}")]
    InsufficientShares { got: usize, need: usize },
    #[error("invalid share: {0}")]
    InvalidShare(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("invalid proof from holder {0}")]
    InvalidProof(HolderId),
    #[error("duplicate contribution from holder {0}")]
    DuplicateContribution(HolderId),
    #[error("signing session {0} already produced a signature")]
    SessionClosed(SessionId),
    #[error("message does not match the signing session")]
    MessageMismatch,
    #[error("unknown escrow {0}")]
    UnknownEscrow(EscrowId),
    #[error("escrow {0} already exists")]
    DuplicateEscrow(EscrowId),
    #[error("unknown signing session {0}")]
    UnknownSession(SessionId),
    #[error("escrow is time-locked until {release_at}")]
    TimeLockActive { release_at: u64 },
    #[error("time-lock puzzle was cancelled")]
    Cancelled,
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, EscrowError>;
