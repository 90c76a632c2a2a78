//! Feldman commitments to the sharing polynomial.
//!
//! `C_j = a_j * G` for each coefficient; a share `y_i` at index `i` is valid
//! iff `y_i * G == sum_j C_j * i^j`.

use curve25519_dalek::traits::VartimeMultiscalarMul;
use curve25519_dalek::{RistrettoPoint, Scalar};

use crate::crypto::polynomial::Polynomial;
use crate::encoding::bytes_to_ristretto_point;
use crate::error::EscrowError;

/// Public commitments to a polynomial, constant term first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeldmanCommitments {
    pub points: Vec<RistrettoPoint>,
}

impl FeldmanCommitments {
    pub fn commit(polynomial: &Polynomial) -> Self {
        FeldmanCommitments {
            points: polynomial
                .coefficients
                .iter()
                .map(RistrettoPoint::mul_base)
                .collect(),
        }
    }

    pub fn from_compressed(commitments: &[[u8; 32]]) -> Result<Self, EscrowError> {
        let points = commitments
            .iter()
            .map(bytes_to_ristretto_point)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FeldmanCommitments { points })
    }

    pub fn to_compressed(&self) -> Vec<[u8; 32]> {
        self.points.iter().map(|p| p.compress().to_bytes()).collect()
    }

    /// Public verification share `f(index) * G`, computed only from the
    /// commitments.
    pub fn verification_share(&self, index: u32) -> RistrettoPoint {
        let x = Scalar::from(index as u64);
        let mut powers = Vec::with_capacity(self.points.len());
        let mut x_power = Scalar::ONE;
        for _ in 0..self.points.len() {
            powers.push(x_power);
            x_power *= x;
        }
        RistrettoPoint::vartime_multiscalar_mul(powers.iter(), self.points.iter())
    }

    pub fn verify_share(&self, index: u32, share: &Scalar) -> bool {
        RistrettoPoint::mul_base(share) == self.verification_share(index)
    }
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;

    #[test]
    fn shares_verify_against_commitments() {
        let mut rng = thread_rng();
        let secret = Scalar::random(&mut rng);
        let poly = Polynomial::random_with_constant(secret, 3, &mut rng);
        let commitments = FeldmanCommitments::commit(&poly);

        assert_eq!(commitments.points[0], RistrettoPoint::mul_base(&secret));
        for (i, share) in poly.get_n_evals(5).iter().enumerate() {
            assert!(commitments.verify_share(i as u32 + 1, share));
        }
        assert_eq!(
            commitments.verification_share(2),
            RistrettoPoint::mul_base(&poly.evaluate_at(&Scalar::from(2u8)))
        );
    }

    #[test]
    fn tampered_share_fails() {
        let mut rng = thread_rng();
        let poly = Polynomial::random_with_constant(Scalar::random(&mut rng), 2, &mut rng);
        let commitments = FeldmanCommitments::commit(&poly);
        let share = poly.evaluate_at(&Scalar::from(1u8)) + Scalar::ONE;
        assert!(!commitments.verify_share(1, &share));
        // right value, wrong index
        assert!(!commitments.verify_share(2, &poly.evaluate_at(&Scalar::from(1u8))));
    }

    #[test]
    fn compressed_round_trip() {
        let mut rng = thread_rng();
        let poly = Polynomial::random_with_constant(Scalar::random(&mut rng), 4, &mut rng);
        let commitments = FeldmanCommitments::commit(&poly);
        let decoded = FeldmanCommitments::from_compressed(&commitments.to_compressed()).unwrap();
        assert_eq!(decoded, commitments);
        assert!(FeldmanCommitments::from_compressed(&[[0xff; 32]]).is_err());
    }
}
