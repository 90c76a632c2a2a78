use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::traits::{Identity, MultiscalarMul};
use curve25519_dalek::{RistrettoPoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::Zeroize;

use crate::crypto::ZkProofError;
use crate::encoding::bytes_to_scalar;

/// Chaum-Pedersen proof that `log_G(Y) = log_H(S)`: the partial signature
/// `S` was computed with the same share that `Y` commits to.

/// Domain separators for the zk proof
pub const DOMAIN_NIZK_PROOF_OF_DLEQ_CHALLENGE: &str = "mpc-escrow-zk-proof-of-dleq-challenge";

#[derive(Clone, Debug)]
pub struct ZkInstanceDleq {
    pub g: RistrettoPoint,
    pub h: RistrettoPoint,
    /// `Y = x * G`
    pub public_share: RistrettoPoint,
    /// `S = x * H`
    pub partial: RistrettoPoint,
}

pub struct ZkWitnessDleq {
    pub share: Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct DleqProof {
    pub challenge: [u8; 32],
    pub response: [u8; 32],
}

impl ZkInstanceDleq {
    pub fn check_instance(&self) -> Result<(), ZkProofError> {
        let identity = RistrettoPoint::identity();
        if self.h.eq(&identity) || self.public_share.eq(&identity) || self.partial.eq(&identity) {
            return Err(ZkProofError::InvalidInstance);
        }
        Ok(())
    }
}

//challenge = H(g,h,Y,S,A,B)
fn zk_dleq_proof_challenge(instance: &ZkInstanceDleq, aa: &RistrettoPoint, bb: &RistrettoPoint) -> Scalar {
    let mut transcript: Vec<u8> = Vec::new();

    transcript.extend_from_slice(DOMAIN_NIZK_PROOF_OF_DLEQ_CHALLENGE.as_bytes());
    transcript.extend_from_slice(b"g");
    transcript.extend_from_slice(instance.g.compress().as_bytes());
    transcript.extend_from_slice(b"h");
    transcript.extend_from_slice(instance.h.compress().as_bytes());
    transcript.extend_from_slice(b"Y");
    transcript.extend_from_slice(instance.public_share.compress().as_bytes());
    transcript.extend_from_slice(b"S");
    transcript.extend_from_slice(instance.partial.compress().as_bytes());
    transcript.extend_from_slice(b"A");
    transcript.extend_from_slice(aa.compress().as_bytes());
    transcript.extend_from_slice(b"B");
    transcript.extend_from_slice(bb.compress().as_bytes());

    Scalar::hash_from_bytes::<Sha512>(&transcript)
}

pub fn prove_nizk_dleq<R: RngCore + CryptoRng>(
    instance: &ZkInstanceDleq,
    witness: &ZkWitnessDleq,
    rng: &mut R,
) -> Result<DleqProof, ZkProofError> {
    instance.check_instance()?;

    let mut alpha = Scalar::random(rng);
    let aa = instance.g * alpha;
    let bb = instance.h * alpha;

    let challenge = zk_dleq_proof_challenge(instance, &aa, &bb);
    let z = alpha + challenge * witness.share;
    alpha.zeroize();

    Ok(DleqProof {
        challenge: challenge.to_bytes(),
        response: z.to_bytes(),
    })
}

pub fn verify_nizk_dleq(instance: &ZkInstanceDleq, nizk: &DleqProof) -> Result<(), ZkProofError> {
    instance.check_instance()?;

    let c = bytes_to_scalar(&nizk.challenge).map_err(|_| ZkProofError::DeserializationError)?;
    let z = bytes_to_scalar(&nizk.response).map_err(|_| ZkProofError::DeserializationError)?;

    // A' = z*G - c*Y, B' = z*H - c*S
    let a_prime = RistrettoPoint::multiscalar_mul(&[z, -c], &[instance.g, instance.public_share]);
    let b_prime = RistrettoPoint::multiscalar_mul(&[z, -c], &[instance.h, instance.partial]);

    let challenge_prime = zk_dleq_proof_challenge(instance, &a_prime, &b_prime);

    if !c.eq(&challenge_prime) {
        return Err(ZkProofError::InvalidProof);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
    use rand::thread_rng;
    use sha2::Sha512;

    use super::*;

    fn setup_instance_and_witness() -> (ZkInstanceDleq, ZkWitnessDleq) {
        let x = Scalar::random(&mut thread_rng());
        let g = RISTRETTO_BASEPOINT_POINT;
        let h = RistrettoPoint::hash_from_bytes::<Sha512>(b"some message");
        let instance = ZkInstanceDleq {
            g,
            h,
            public_share: g * x,
            partial: h * x,
        };
        (instance, ZkWitnessDleq { share: x })
    }

    #[test]
    fn nizk_should_verify() {
        let (instance, witness) = setup_instance_and_witness();
        let proof = prove_nizk_dleq(&instance, &witness, &mut thread_rng()).unwrap();
        assert_eq!(Ok(()), verify_nizk_dleq(&instance, &proof));
    }

    #[test]
    fn prover_should_fail_on_invalid_instance() {
        let (mut instance, witness) = setup_instance_and_witness();
        instance.h = RistrettoPoint::identity();
        assert_eq!(
            Err(ZkProofError::InvalidInstance),
            prove_nizk_dleq(&instance, &witness, &mut thread_rng())
        );
    }

    #[test]
    fn nizk_should_fail_on_invalid_proof() {
        let (instance, witness) = setup_instance_and_witness();
        let mut invalid = prove_nizk_dleq(&instance, &witness, &mut thread_rng()).unwrap();
        invalid.response = Scalar::random(&mut thread_rng()).to_bytes();
        assert_eq!(Err(ZkProofError::InvalidProof), verify_nizk_dleq(&instance, &invalid));
    }

    #[test]
    fn nizk_should_fail_for_other_base() {
        let (instance, witness) = setup_instance_and_witness();
        let proof = prove_nizk_dleq(&instance, &witness, &mut thread_rng()).unwrap();
        let other = ZkInstanceDleq {
            h: RistrettoPoint::hash_from_bytes::<Sha512>(b"another message"),
            ..instance
        };
        assert!(verify_nizk_dleq(&other, &proof).is_err());
    }

    #[test]
    fn non_canonical_proof_is_rejected() {
        let (instance, witness) = setup_instance_and_witness();
        let mut proof = prove_nizk_dleq(&instance, &witness, &mut thread_rng()).unwrap();
        proof.challenge = [0xff; 32];
        assert_eq!(
            Err(ZkProofError::DeserializationError),
            verify_nizk_dleq(&instance, &proof)
        );
    }
}
