use curve25519_dalek::Scalar;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A univariate polynomial over the Ristretto scalar field.
/// Note: The polynomial terms are: coefficients[i] * x^i
///       E.g. 3 + 2x + x^2 is encoded as:
///       Polynomial{ coefficients: [3,2,1] }
///
/// Coefficients are kept as given, including trailing zeros, so that the
/// number of Feldman commitments always equals the threshold.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Polynomial {
    pub coefficients: Vec<Scalar>,
}

impl From<Vec<Scalar>> for Polynomial {
    fn from(coefficients: Vec<Scalar>) -> Self {
        Polynomial { coefficients }
    }
}

impl Polynomial {
    /// Samples a polynomial with `number_of_coefficients` coefficients whose
    /// constant term is `constant` and whose other terms are uniform.
    pub fn random_with_constant<R: RngCore + CryptoRng>(
        constant: Scalar,
        number_of_coefficients: usize,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(number_of_coefficients.max(1));
        coefficients.push(constant);
        for _ in 1..number_of_coefficients {
            coefficients.push(Scalar::random(rng));
        }
        Polynomial { coefficients }
    }

    /// Evaluate the polynomial at x
    /// Note: This uses Horner's method: https://en.wikipedia.org/wiki/Horner%27s_method
    pub fn evaluate_at(&self, x: &Scalar) -> Scalar {
        let mut ans = Scalar::ZERO;
        for coeff in self.coefficients.iter().rev() {
            ans *= x;
            ans += coeff;
        }
        ans
    }

    /// Evaluations at `x = 1..=n`; index `i - 1` holds `f(i)`.
    pub fn get_n_evals(&self, n: usize) -> Vec<Scalar> {
        (1..=n)
            .map(|i| self.evaluate_at(&Scalar::from(i as u64)))
            .collect()
    }
}
