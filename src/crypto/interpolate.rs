use std::collections::HashSet;
use std::ops::MulAssign;

use curve25519_dalek::Scalar;

/// Interpolation failed because of duplicate x-coordinates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterpolationError {
    DuplicateX,
}

fn contains_duplicates(scalars: &[Scalar]) -> bool {
    let mut set = HashSet::new();

    for scalar in scalars {
        if !set.insert(scalar.to_bytes()) {
            return true;
        }
    }

    false
}

/// Compute the Lagrange coefficients at x=0.
///
/// # Arguments
/// * `samples` is a list of values x_0, x_1, ...x_n.
/// # Result
/// * `[lagrange_0, lagrange_1, ..., lagrange_n]` where:
///    * lagrange_i = numerator_i/denominator_i
///    * numerator_i = x_0 * x_1 * ... * x_(i-1) * x_(i+1) * ... * x_n
///    * denominator_i = (x_0 - x_i) * (x_1 - x_i) * ... * (x_(i-1) - x_i) *
///      (x_(i+1) - x_i) * ... * (x_n - x_i)
/// # Errors
/// `InterpolationError::DuplicateX`: in case the interpolation points `samples` are not all distinct.
pub fn lagrange_coefficients_at_zero(samples: &[Scalar]) -> Result<Vec<Scalar>, InterpolationError> {
    let len = samples.len();
    if len == 0 {
        return Ok(Vec::new());
    }
    if len == 1 {
        return Ok(vec![Scalar::ONE]);
    }

    if contains_duplicates(samples) {
        return Err(InterpolationError::DuplicateX);
    }

    // The j'th numerator is the product of all `x_prod[i]` for `i!=j`.
    // Note: The usual subtractions can be omitted as we are computing the Lagrange
    // coefficient at zero.
    let mut x_prod: Vec<Scalar> = Vec::with_capacity(len);
    let mut tmp = Scalar::ONE;
    x_prod.push(tmp);
    for x in samples.iter().take(len - 1) {
        tmp *= x;
        x_prod.push(tmp);
    }
    tmp = Scalar::ONE;
    for (i, x) in samples[1..].iter().enumerate().rev() {
        tmp *= x;
        x_prod[i] *= tmp;
    }

    for (i, (lagrange_0, x_i)) in x_prod.iter_mut().zip(samples).enumerate() {
        // Compute the value at 0 of the Lagrange polynomial that is `0` at the other
        // data points but `1` at `x`.
        let mut denom = Scalar::ONE;
        for (_, x_j) in samples.iter().enumerate().filter(|(j, _)| *j != i) {
            denom *= x_j - x_i;
        }

        if denom == Scalar::ZERO {
            return Err(InterpolationError::DuplicateX);
        }
        lagrange_0.mul_assign(denom.invert());
    }
    Ok(x_prod)
}

/// Lagrange coefficients for 1-based share indices.
pub fn lagrange_coefficients_for_indices(indices: &[u32]) -> Result<Vec<Scalar>, InterpolationError> {
    let xs: Vec<Scalar> = indices.iter().map(|i| Scalar::from(*i as u64)).collect();
    lagrange_coefficients_at_zero(&xs)
}

/// Given samples `(x, f(x))` returns `f(0)`.
/// See: https://en.wikipedia.org/wiki/Shamir%27s_Secret_Sharing#Computationally_efficient_approach
pub fn interpolate_scalar(samples: &[(Scalar, Scalar)]) -> Result<Scalar, InterpolationError> {
    let all_x: Vec<_> = samples.iter().map(|(x, _)| *x).collect();
    let coefficients = lagrange_coefficients_at_zero(&all_x)?;
    let mut result = Scalar::ZERO;
    for (coefficient, sample) in coefficients.iter().zip(samples.iter().map(|(_, y)| y)) {
        result += sample * coefficient;
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use curve25519_dalek::Scalar;
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    use super::*;
    use crate::crypto::polynomial::Polynomial;

    /// Polynomial evaluation for small polynomials; this will overflow and panic if
    /// used for large values.
    pub fn evaluate_integer_polynomial(x: u32, polynomial: &[u32]) -> u32 {
        let mut ans = 0u32;
        let mut power = 1u32;
        for coefficient in polynomial {
            ans += power * coefficient;
            power *= x;
        }
        ans
    }

    #[test]
    fn test_scalar_interpolation_is_correct() {
        let polynomial = [2, 4, 9];
        let samples: Vec<_> = [5u32, 3, 8]
            .iter()
            .map(|x| (Scalar::from(*x), Scalar::from(evaluate_integer_polynomial(*x, &polynomial))))
            .collect();

        let interpolated = interpolate_scalar(&samples).expect("Failed to interpolate");
        assert_eq!(interpolated, Scalar::from(2u32));
    }

    #[test]
    fn lagrange_coefficients_sum_to_one() {
        // l1 = 3, l2 = -3, l3 = 1 for indices [1, 2, 3]
        let coeffs = lagrange_coefficients_for_indices(&[1, 2, 3]).unwrap();
        assert_eq!(coeffs[0], Scalar::from(3u8));
        assert_eq!(coeffs[1], -Scalar::from(3u8));
        assert_eq!(coeffs[2], Scalar::ONE);
        assert_eq!(coeffs.iter().sum::<Scalar>(), Scalar::ONE);
    }

    #[test]
    fn duplicate_x_is_rejected() {
        assert_eq!(
            lagrange_coefficients_for_indices(&[1, 2, 2]),
            Err(InterpolationError::DuplicateX)
        );
    }

    #[test]
    fn random_polynomials_interpolate_from_any_subset() {
        let mut rng = thread_rng();
        for n in 2..=7usize {
            for k in 2..=n {
                let secret = Scalar::random(&mut rng);
                let poly = Polynomial::random_with_constant(secret, k, &mut rng);
                let mut samples: Vec<(Scalar, Scalar)> = (1..=n as u64)
                    .map(|i| (Scalar::from(i), poly.evaluate_at(&Scalar::from(i))))
                    .collect();
                for _ in 0..5 {
                    samples.shuffle(&mut rng);
                    assert_eq!(interpolate_scalar(&samples[..k]).unwrap(), secret, "k={} n={}", k, n);
                }
                // k - 1 points determine a different polynomial
                assert_ne!(interpolate_scalar(&samples[..k - 1]).unwrap(), secret);
            }
        }
    }
}
