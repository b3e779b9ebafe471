//! Scoring engine: maps a guess and the correct year to a point value.
//!
//! The score depends only on the absolute distance between the two years.
//! Bands are evaluated in order and the first match wins; every band has a
//! floor so the result is always within [`MIN_SCORE`, `PERFECT_SCORE`].

/// Points for an exact guess.
pub const PERFECT_SCORE: u32 = 1000;

/// Lowest possible score, awarded for guesses more than 4000 years off.
pub const MIN_SCORE: u32 = 10;

/// The distance band a guess fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ScoreBand {
    /// Distance of zero.
    Exact,
    /// Within a century.
    Century,
    /// Within 500 years.
    HalfMillennium,
    /// Within 1000 years.
    Millennium,
    /// Within 2000 years.
    TwoMillennia,
    /// Anything further.
    Distant,
}

impl ScoreBand {
    /// Inclusive upper bound on the distance covered by this band, `None` for [`ScoreBand::Distant`].
    #[must_use]
    pub const fn max_distance(self) -> Option<u64> {
        match self {
            Self::Exact => Some(0),
            Self::Century => Some(100),
            Self::HalfMillennium => Some(500),
            Self::Millennium => Some(1000),
            Self::TwoMillennia => Some(2000),
            Self::Distant => None,
        }
    }

    /// Score awarded for `distance` inside this band, clamped to the band's floor.
    #[must_use]
    pub const fn points(self, distance: u64) -> u32 {
        let (raw, floor) = match self {
            Self::Exact => return PERFECT_SCORE,
            Self::Century => (800i64 - 3 * distance as i64, 500),
            Self::HalfMillennium => (500i64 - distance as i64, 200),
            Self::Millennium => (200i64 - (distance / 10) as i64, 100),
            Self::TwoMillennia => (100i64 - (distance / 20) as i64, 50),
            Self::Distant => {
                // Saturate so huge distances cannot wrap the subtraction
                let penalty = if distance / 100 > 50 { 50 } else { distance / 100 };
                (50i64 - penalty as i64, MIN_SCORE as i64)
            },
        };
        if raw > floor {
            raw as u32
        } else {
            floor as u32
        }
    }
}

/// Returns the band that `distance` falls into.
#[must_use]
pub const fn band_for(distance: u64) -> ScoreBand {
    match distance {
        0 => ScoreBand::Exact,
        1..=100 => ScoreBand::Century,
        101..=500 => ScoreBand::HalfMillennium,
        501..=1000 => ScoreBand::Millennium,
        1001..=2000 => ScoreBand::TwoMillennia,
        _ => ScoreBand::Distant,
    }
}

/// Scores `guess` against `correct_year`.
///
/// Total over all `i64` inputs and always in `[10, 1000]`.
///
/// ```
/// use year_duel::scoring::score;
///
/// assert_eq!(score(1000, 1000), 1000);
/// assert_eq!(score(1900, 2000), 500);
/// assert_eq!(score(1850, 2000), 350);
/// assert_eq!(score(-4000, 2000), 10);
/// ```
#[must_use]
pub const fn score(guess: i64, correct_year: i64) -> u32 {
    let distance = guess.abs_diff(correct_year);
    band_for(distance).points(distance)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn exact_guess_is_perfect() {
        for year in [-5000, -1, 0, 1, 1969, i64::MAX, i64::MIN] {
            assert_eq!(score(year, year), PERFECT_SCORE);
        }
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(score(1001, 1000), 797);
        assert_eq!(score(1100, 1000), 500);
        assert_eq!(score(1101, 1000), 399);
        assert_eq!(score(1500, 1000), 200);
        assert_eq!(score(1501, 1000), 150);
        assert_eq!(score(2000, 1000), 100);
        assert_eq!(score(2001, 1000), 50);
        assert_eq!(score(3000, 1000), 50);
        assert_eq!(score(3001, 1000), 30);
        assert_eq!(score(7000, 1000), 10);
    }

    #[test]
    fn century_band_hits_its_floor() {
        // 800 - 3 * 100 == 500, the floor itself
        assert_eq!(score(1900, 2000), 500);
        assert_eq!(score(1950, 2000), 650);
    }

    #[test]
    fn symmetric_in_direction() {
        assert_eq!(score(800, 1000), score(1200, 1000));
        assert_eq!(score(-300, 0), score(300, 0));
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        assert_eq!(score(i64::MIN, i64::MAX), MIN_SCORE);
        assert_eq!(score(i64::MAX, i64::MIN), MIN_SCORE);
    }

    #[test]
    fn fork_scenario_scores() {
        assert_eq!(score(1200, 1000), 300);
        assert_eq!(score(500, 1000), 200);
    }

    #[test]
    fn band_for_matches_max_distance() {
        for distance in [0u64, 1, 100, 101, 500, 501, 1000, 1001, 2000, 2001, 10_000] {
            let band = band_for(distance);
            if let Some(max) = band.max_distance() {
                assert!(distance <= max, "{distance} outside {band:?}");
            }
        }
        assert_eq!(band_for(2001), ScoreBand::Distant);
    }
}
