//! Retry backoff math, extracted as a pure function so it is reproducible
//! and unit-testable without a running worker.
//!
//! Grounded on the teacher's `ScreenshotService::calculate_retry_delay`
//! (exponential backoff capped at a max delay), extended with jitter seeded
//! per run so a fixed seed reproduces the exact delay sequence in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// `delay(attempt, base) = base * 2^(attempt-1) * uniform(0.8, 1.2)`.
///
/// `attempt` is 1-indexed (the first retry is `attempt == 1`). `rng` is
/// passed in so callers can seed it once per run for reproducible tests and
/// share it across retries within that run.
pub fn delay(attempt: usize, base: Duration, rng: &mut StdRng) -> Duration {
    debug_assert!(attempt >= 1, "attempt is 1-indexed");
    let exponent = (attempt - 1) as u32;
    let factor = 2u64.saturating_pow(exponent);
    let jitter = rng.gen_range(0.8..=1.2);
    base.saturating_mul(factor as u32).mul_f64(jitter)
}

/// Builds a seeded RNG for one run's retry jitter. Using the run id as seed
/// material keeps a run's delay sequence stable if it's ever replayed
/// against cached data in tests.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
