//! Injectable randomness for quote variance, network delay and synthetic tx ids.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Source of every random draw the router and pipeline make
pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[low, high]`. Returns `low` when the range is empty.
    fn uniform(&self, low: f64, high: f64) -> f64;

    /// Opaque token used as a synthetic transaction id
    fn token(&self) -> String;
}

/// `StdRng` behind a mutex; seedable for reproducible runs.
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for StdRandom {
    fn uniform(&self, low: f64, high: f64) -> f64 {
        if !(low < high) {
            return low;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(low..=high)
    }

    fn token(&self) -> String {
        let mut bytes = [0u8; 32];
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill(&mut bytes[..]);
        format!("0x{}", hex::encode(bytes))
    }
}

/// Replays a fixed sequence of unit fractions, then repeats `fallback`.
///
/// Each fraction `f` in `[0, 1]` maps to `low + (high - low) * f`, so 0.5
/// lands on the midpoint of any range (zero variance, average delay).
pub struct SequenceRandom {
    fractions: Mutex<VecDeque<f64>>,
    fallback: f64,
    tokens: AtomicU64,
}

impl SequenceRandom {
    pub fn new(fractions: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            fractions: Mutex::new(fractions.into_iter().collect()),
            fallback: fallback.clamp(0.0, 1.0),
            tokens: AtomicU64::new(0),
        }
    }

    /// Always the midpoint
    pub fn midpoint() -> Self {
        Self::new([], 0.5)
    }
}

impl RandomSource for SequenceRandom {
    fn uniform(&self, low: f64, high: f64) -> f64 {
        let fraction = self
            .fractions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
            .clamp(0.0, 1.0);
        if !(low < high) {
            return low;
        }
        low + (high - low) * fraction
    }

    fn token(&self) -> String {
        let n = self.tokens.fetch_add(1, Ordering::Relaxed) + 1;
        format!("0x{:064x}", n)
    }
}
