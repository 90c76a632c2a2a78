use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::{RistrettoPoint, Scalar};

use crate::config::EscrowConfig;
use crate::error::EscrowError;
use crate::types::{KeyShard, SignatureShare, ThresholdSignature, TimeLock, VerificationData};

pub const WIRE_VERSION: u8 = 1;

pub fn bytes_to_ristretto_point(bytes: &[u8; 32]) -> Result<RistrettoPoint, EscrowError> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or_else(|| EscrowError::Encoding(String::from("Could not deserialize Ristretto point")))
}

/// Only canonical encodings are accepted so that every scalar has exactly
/// one byte representation.
pub fn bytes_to_scalar(bytes: &[u8; 32]) -> Result<Scalar, EscrowError> {
    Option::<Scalar>::from(Scalar::from_canonical_bytes(*bytes))
        .ok_or_else(|| EscrowError::Encoding(String::from("Could not deserialize Scalar")))
}

/// Versioned, tagged borsh encoding for structures that cross device
/// boundaries: `[WIRE_VERSION][TAG][borsh payload]`.
pub trait WireFormat: BorshSerialize + BorshDeserialize {
    const TAG: u8;

    fn to_wire_bytes(&self) -> Result<Vec<u8>, EscrowError> {
        let mut out = vec![WIRE_VERSION, Self::TAG];
        self.serialize(&mut out)
            .map_err(|e| EscrowError::Encoding(e.to_string()))?;
        Ok(out)
    }

    fn from_wire_bytes(bytes: &[u8]) -> Result<Self, EscrowError> {
        match bytes {
            [version, ..] if *version != WIRE_VERSION => Err(EscrowError::Encoding(format!(
                "unsupported wire version {}",
                version
            ))),
            [_, tag, payload @ ..] if *tag == Self::TAG => Self::try_from_slice(payload)
                .map_err(|e| EscrowError::Encoding(e.to_string())),
            [_, tag, ..] => Err(EscrowError::Encoding(format!(
                "unexpected type tag {}, expected {}",
                tag,
                Self::TAG
            ))),
            _ => Err(EscrowError::Encoding(String::from("truncated header"))),
        }
    }
}

impl WireFormat for KeyShard {
    const TAG: u8 = 0x01;
}

impl WireFormat for VerificationData {
    const TAG: u8 = 0x02;
}

impl WireFormat for TimeLock {
    const TAG: u8 = 0x03;
}

impl WireFormat for SignatureShare {
    const TAG: u8 = 0x04;
}

impl WireFormat for ThresholdSignature {
    const TAG: u8 = 0x05;
}

impl WireFormat for EscrowConfig {
    const TAG: u8 = 0x06;
}
