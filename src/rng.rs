//! Small PCG32 random number generator used for item draws and fault injection.
//!
//! PCG-XSH-RR with 64 bits of state and 32-bit output. Seeding with a fixed
//! value makes every draw reproducible, which the tests and the chaos channel
//! rely on.
//!
//! ```rust
//! use year_duel::rng::{Pcg32, Rng, SeedableRng};
//!
//! let mut rng = Pcg32::seed_from_u64(12345);
//! let index = rng.gen_range_usize(0..28);
//! assert!(index < 28);
//! ```

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
};

/// PCG32 random number generator.
///
/// NOT cryptographically secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

/// Default increment for single-stream PCG32.
const PCG_DEFAULT_INCREMENT: u64 = 1442695040888963407;

/// Multiplier constant for the LCG step.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

impl Pcg32 {
    /// Creates a new PCG32 generator with the given state and stream.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        // The increment must be odd
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Generates the next 32-bit random value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        // XSH-RR output permutation
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generates the next 64-bit random value by combining two 32-bit values.
    #[inline]
    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }
}

/// Trait for seeding random number generators.
pub trait SeedableRng: Sized {
    /// Creates a new RNG seeded from a 64-bit value.
    #[must_use]
    fn seed_from_u64(seed: u64) -> Self;

    /// Creates a new RNG with a seed derived from the wall clock.
    #[must_use]
    fn from_entropy() -> Self;
}

impl SeedableRng for Pcg32 {
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_INCREMENT)
    }

    fn from_entropy() -> Self {
        Self::seed_from_u64(timing_entropy_seed())
    }
}

/// Trait for random number generation.
pub trait Rng {
    /// Returns the next 32-bit random value.
    fn next_u32(&mut self) -> u32;

    /// Returns the next 64-bit random value.
    fn next_u64(&mut self) -> u64;

    /// Generates a random `usize` value in the given range `[low, high)`.
    ///
    /// # Empty Range Behavior
    /// If `range.is_empty()`, reports a violation via telemetry and returns `range.start`.
    fn gen_range_usize(&mut self, range: std::ops::Range<usize>) -> usize {
        let span = range.end.wrapping_sub(range.start);
        if range.is_empty() {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "gen_range_usize called with empty range [{}..{})",
                range.start,
                range.end
            );
            return range.start;
        }

        // Rejection sampling avoids modulo bias
        let span64 = span as u64;
        let threshold = span64.wrapping_neg() % span64;
        loop {
            let random_value = self.next_u64();
            if random_value >= threshold {
                return range.start.wrapping_add((random_value % span64) as usize);
            }
        }
    }

    /// Generates a random boolean with the given probability of being `true`.
    ///
    /// Values outside `[0.0, 1.0]` are clamped.
    fn gen_bool(&mut self, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        if p >= 1.0 {
            return true;
        }
        let threshold = (p * f64::from(u32::MAX)) as u32;
        self.next_u32() < threshold
    }
}

impl Rng for Pcg32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        Self::next_u32(self)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        Self::next_u64(self)
    }
}

/// Gets a clock-based seed for RNG initialization.
///
/// Intentionally non-deterministic. Use [`Pcg32::seed_from_u64`] when
/// reproducible draws are needed.
fn timing_entropy_seed() -> u64 {
    use web_time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0);
    let marker = 0u8;
    let stack_addr = std::ptr::addr_of!(marker) as usize as u64;

    // splitmix64 finalizer
    let mut z = nanos ^ stack_addr.rotate_left(32) ^ 0x9e3779b97f4a7c15;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn test_pcg32_deterministic() {
        let mut rng1 = Pcg32::seed_from_u64(12345);
        let mut rng2 = Pcg32::seed_from_u64(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_pcg32_different_seeds() {
        let mut rng1 = Pcg32::seed_from_u64(12345);
        let mut rng2 = Pcg32::seed_from_u64(54321);

        let mut same_count = 0;
        for _ in 0..100 {
            if rng1.next_u32() == rng2.next_u32() {
                same_count += 1;
            }
        }
        assert!(same_count < 10);
    }

    #[test]
    fn test_gen_range_usize_bounds_and_coverage() {
        let mut rng = Pcg32::seed_from_u64(42);
        let mut seen = [false; 10];

        for _ in 0..1000 {
            let val = rng.gen_range_usize(10..20);
            assert!((10..20).contains(&val));
            seen[val - 10] = true;
        }
        assert!(seen.iter().all(|&s| s), "every value should be drawn: {seen:?}");
    }

    #[test]
    fn test_gen_range_usize_single_value() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(rng.gen_range_usize(3..4), 3);
        }
    }

    #[test]
    fn test_gen_range_usize_empty_returns_start() {
        let mut rng = Pcg32::seed_from_u64(42);
        assert_eq!(rng.gen_range_usize(500..500), 500);
        assert_eq!(rng.gen_range_usize(0..0), 0);
    }

    #[test]
    fn test_gen_bool_edges_and_balance() {
        let mut rng = Pcg32::seed_from_u64(42);

        for _ in 0..100 {
            assert!(!rng.gen_bool(0.0));
            assert!(rng.gen_bool(1.0));
        }

        let true_count = (0..10_000).filter(|_| rng.gen_bool(0.5)).count();
        assert!(true_count > 4500, "Too few trues: {true_count}");
        assert!(true_count < 5500, "Too many trues: {true_count}");
    }

    #[test]
    fn test_seedable_from_entropy() {
        let mut rng = Pcg32::from_entropy();
        let _ = rng.next_u32();
    }
}
