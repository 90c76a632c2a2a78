use std::fmt;

pub mod feldman;
pub mod interpolate;
pub mod kem;
pub mod nizk_dleq;
pub mod polynomial;
pub mod sloth;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZkProofError {
    InvalidProof,
    InvalidInstance,
    DeserializationError,
}

impl fmt::Display for ZkProofError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZkProofError::InvalidProof => write!(f, "Invalid proof provided"),
            ZkProofError::InvalidInstance => write!(f, "Invalid instance data"),
            ZkProofError::DeserializationError => write!(f, "Deserialization Error"),
        }
    }
}

impl std::error::Error for ZkProofError {}
