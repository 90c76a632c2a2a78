//! Per-holder share encryption.
//!
//! ECIES-style: an ephemeral X25519 key agrees a secret with the holder's
//! public key, HKDF-SHA256 expands it into an XChaCha20-Poly1305 key and a
//! key-confirmation tag. The tag lets the holder tell "this is not my key"
//! apart from "the ciphertext was modified" after a successful agreement.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::EscrowError;
use crate::holder::HolderKey;
use crate::types::{Encapsulation, HolderPublicKey};

pub const DOMAIN_SHARD_KEM_SALT: &[u8] = b"mpc-escrow/shard-kem/v1";
const INFO_AEAD_KEY: &[u8] = b"aead-key";
const INFO_KEY_CONFIRMATION: &[u8] = b"key-confirmation";

/// Randomness for one encapsulation, drawn up front so that sealing can run
/// on worker threads.
pub struct EncapsulationSeed {
    pub ephemeral_secret: Zeroizing<[u8; 32]>,
    pub nonce: [u8; 24],
}

struct DerivedKeys {
    aead_key: Zeroizing<[u8; 32]>,
    key_confirmation: [u8; 32],
}

fn derive_keys(
    shared: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient: &HolderPublicKey,
) -> Result<DerivedKeys, EscrowError> {
    let hk = Hkdf::<Sha256>::new(Some(DOMAIN_SHARD_KEM_SALT), shared);

    let mut context = Vec::with_capacity(64 + INFO_KEY_CONFIRMATION.len());
    context.extend_from_slice(ephemeral_public);
    context.extend_from_slice(&recipient.0);

    let mut aead_key = Zeroizing::new([0u8; 32]);
    let mut info = context.clone();
    info.extend_from_slice(INFO_AEAD_KEY);
    hk.expand(&info, &mut *aead_key)
        .map_err(|e| EscrowError::Encoding(format!("hkdf expand: {}", e)))?;

    let mut key_confirmation = [0u8; 32];
    context.extend_from_slice(INFO_KEY_CONFIRMATION);
    hk.expand(&context, &mut key_confirmation)
        .map_err(|e| EscrowError::Encoding(format!("hkdf expand: {}", e)))?;

    Ok(DerivedKeys {
        aead_key,
        key_confirmation,
    })
}

/// Encrypts `plaintext` so that only the holder of `recipient` can open it.
pub fn seal_to_holder(
    recipient: &HolderPublicKey,
    seed: EncapsulationSeed,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Encapsulation, Vec<u8>), EscrowError> {
    let ephemeral = StaticSecret::from(*seed.ephemeral_secret);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(recipient.0));
    if !shared.was_contributory() {
        return Err(EscrowError::Encoding(String::from(
            "holder public key is a low-order point",
        )));
    }

    let keys = derive_keys(shared.as_bytes(), &ephemeral_public, recipient)?;
    let aead = XChaCha20Poly1305::new((&*keys.aead_key).into());
    let ciphertext = aead
        .encrypt(XNonce::from_slice(&seed.nonce), Payload { msg: plaintext, aad })
        .map_err(|_| EscrowError::Encoding(String::from("share encryption failed")))?;

    Ok((
        Encapsulation {
            ephemeral_public,
            key_confirmation: keys.key_confirmation,
            nonce: seed.nonce,
        },
        ciphertext,
    ))
}

/// Opens a ciphertext produced by [`seal_to_holder`].
///
/// # Errors
/// * `Decryption` if `holder` is not the key the ciphertext was sealed to.
/// * `Integrity` if the key matches but the ciphertext or `aad` was altered.
pub fn open_as_holder<K: HolderKey + ?Sized>(
    holder: &K,
    encapsulation: &Encapsulation,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, EscrowError> {
    let shared = holder.key_agreement(&encapsulation.ephemeral_public)?;
    let keys = derive_keys(&shared, &encapsulation.ephemeral_public, &holder.public_key())?;

    if !bool::from(keys.key_confirmation.ct_eq(&encapsulation.key_confirmation)) {
        return Err(EscrowError::Decryption(String::from(
            "encapsulation does not correspond to this holder key",
        )));
    }

    let aead = XChaCha20Poly1305::new((&*keys.aead_key).into());
    aead.decrypt(XNonce::from_slice(&encapsulation.nonce), Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|_| EscrowError::Integrity(String::from("shard ciphertext failed authentication")))
}
