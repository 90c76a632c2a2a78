//! # Sloth sequential puzzle
//!
//! Iterated modular square roots (Lenstra and Wesolowski, "A random zoo:
//! sloth, unicorn, and trx", 2015) over the base field of secp256k1, where
//! `p = 3 (mod 4)`.
//!
//! ## Overview
//!
//! One step maps `x` to `rho(x + c_i)`, where `rho` takes the square root of
//! `x` (even representative) if `x` is a quadratic residue, and otherwise the
//! square root of `-x` (odd representative). Because `-1` is a non-residue
//! for this `p`, `rho` is a permutation of the field and its inverse is a
//! single squaring:
//!
//! - `rho^-1(y) = y^2` if `y` is even,
//! - `rho^-1(y) = -y^2` if `y` is odd.
//!
//! A square root costs a full exponentiation, a squaring costs one
//! multiplication, and each step depends on the previous one. The creator
//! picks the puzzle output and [`unwind`]s to the puzzle start cheaply; the
//! opener has to [`wind`] forward through every square root in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ark_ff::{BigInteger, Field, PrimeField, UniformRand};
use ark_secp256k1::Fq;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::Rng;

use crate::error::EscrowError;

/// How many steps run between two cancellation checks.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

pub type PuzzleElement = Fq;

fn is_even(x: &Fq) -> bool {
    x.into_bigint().is_even()
}

fn step_constant(step: u64) -> Fq {
    Fq::from(step + 1)
}

/// The slow direction: one modular square root.
fn rho(x: &Fq) -> Fq {
    let (root, want_even) = match x.sqrt() {
        Some(root) => (root, true),
        // p = 3 (mod 4): exactly one of x, -x is a residue
        None => ((-*x).sqrt().unwrap_or_default(), false),
    };
    if is_even(&root) == want_even {
        root
    } else {
        -root
    }
}

/// The fast direction: one squaring.
fn rho_inverse(y: &Fq) -> Fq {
    let square = y.square();
    if is_even(y) {
        square
    } else {
        -square
    }
}

/// Runs `steps` fast inverse steps from the puzzle output back to the
/// puzzle start.
pub fn unwind(output: &Fq, steps: u64) -> Fq {
    let mut x = *output;
    for step in (0..steps).rev() {
        x = rho_inverse(&x) - step_constant(step);
    }
    x
}

/// Runs `steps` sequential square roots from the puzzle start. Checks
/// `cancel` every [`CANCEL_CHECK_INTERVAL`] steps and returns
/// `EscrowError::Cancelled` without a result once it is set.
pub fn wind(start: &Fq, steps: u64, cancel: &AtomicBool) -> Result<Fq, EscrowError> {
    let mut x = *start;
    for step in 0..steps {
        if step % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(EscrowError::Cancelled);
        }
        x = rho(&(x + step_constant(step)));
    }
    Ok(x)
}

pub fn random_element<R: Rng>(rng: &mut R) -> Fq {
    Fq::rand(rng)
}

pub fn element_to_bytes(x: &Fq) -> Result<[u8; 32], EscrowError> {
    let mut buf = Vec::with_capacity(32);
    x.serialize_compressed(&mut buf)
        .map_err(|e| EscrowError::Encoding(e.to_string()))?;
    buf.try_into()
        .map_err(|_| EscrowError::Encoding(String::from("unexpected field element length")))
}

pub fn element_from_bytes(bytes: &[u8; 32]) -> Result<Fq, EscrowError> {
    Fq::deserialize_compressed(&bytes[..]).map_err(|e| EscrowError::Encoding(e.to_string()))
}

/// Measured throughput of [`wind`] on this machine. Feeds
/// [`crate::config::EngineSettings::calibrated`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PuzzleCalibration {
    pub steps_per_second: u64,
}

impl PuzzleCalibration {
    /// Times `sample_steps` square roots.
    pub fn measure(sample_steps: u64) -> Result<Self, EscrowError> {
        let sample_steps = sample_steps.max(1);
        let never = AtomicBool::new(false);
        let started = Instant::now();
        wind(&Fq::from(7u64), sample_steps, &never)?;
        let elapsed = started.elapsed().max(Duration::from_micros(1));
        let steps_per_second = (sample_steps as u128 * 1_000_000 / elapsed.as_micros()).max(1);
        Ok(PuzzleCalibration {
            steps_per_second: u64::try_from(steps_per_second).unwrap_or(u64::MAX),
        })
    }
}
