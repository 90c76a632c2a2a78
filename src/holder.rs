//! Holder key capability.
//!
//! The engine never stores a holder's long-term private key. Everything it
//! needs from the private half goes through [`HolderKey::key_agreement`], so
//! a secure-enclave backed key and an in-memory software key are
//! interchangeable.

use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::EscrowError;
use crate::types::{HolderId, HolderPublicKey};

pub trait HolderKey: Send + Sync {
    fn public_key(&self) -> HolderPublicKey;

    fn holder_id(&self) -> HolderId {
        HolderId::from_public_key(&self.public_key())
    }

    /// X25519 Diffie-Hellman between the holder's private key and a sender's
    /// ephemeral public key.
    fn key_agreement(&self, ephemeral_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, EscrowError>;
}

/// Holder key kept in process memory; wiped on drop.
pub struct SoftwareHolderKey {
    secret: StaticSecret,
    public: PublicKey,
}

impl SoftwareHolderKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = PublicKey::from(&secret);
        SoftwareHolderKey { secret, public }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        SoftwareHolderKey { secret, public }
    }
}

impl HolderKey for SoftwareHolderKey {
    fn public_key(&self) -> HolderPublicKey {
        HolderPublicKey(self.public.to_bytes())
    }

    fn key_agreement(&self, ephemeral_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, EscrowError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*ephemeral_public));
        if !shared.was_contributory() {
            return Err(EscrowError::Decryption(String::from(
                "non-contributory key agreement",
            )));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl<K: HolderKey + ?Sized> HolderKey for Box<K> {
    fn public_key(&self) -> HolderPublicKey {
        (**self).public_key()
    }

    fn holder_id(&self) -> HolderId {
        (**self).holder_id()
    }

    fn key_agreement(&self, ephemeral_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, EscrowError> {
        (**self).key_agreement(ephemeral_public)
    }
}
