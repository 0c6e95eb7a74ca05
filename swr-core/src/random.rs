//! Uniform random draws for probabilistic early expiration.
//!
//! The early-expiration formula takes the logarithm of the draw, so every
//! source here yields values in the half-open interval (0, 1]. Zero is
//! excluded by drawing an integer in `[1, u64::MAX]` and dividing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Source of uniform draws in (0, 1].
pub trait RandomSource: Send + Sync {
    fn unit_interval(&self) -> f64;
}

fn scale(n: u64) -> f64 {
    n as f64 / u64::MAX as f64
}

/// Thread-local generator from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn unit_interval(&self) -> f64 {
        scale(rand::rng().random_range(1..=u64::MAX))
    }
}

/// Deterministic generator for reproducible runs.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn unit_interval(&self) -> f64 {
        let n = match self.rng.lock() {
            Ok(mut rng) => rng.random_range(1..=u64::MAX),
            Err(poisoned) => poisoned.into_inner().random_range(1..=u64::MAX),
        };
        scale(n)
    }
}

/// Always returns the same draw.
///
/// Values outside (0, 1] are clamped into it.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(f64);

impl FixedRandom {
    pub fn new(value: f64) -> Self {
        let value = if value.is_nan() || value <= 0.0 {
            f64::MIN_POSITIVE
        } else {
            value.min(1.0)
        };
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl RandomSource for FixedRandom {
    fn unit_interval(&self) -> f64 {
        self.0
    }
}
