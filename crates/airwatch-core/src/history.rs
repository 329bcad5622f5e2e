//! Synthetic CO trend series.
//!
//! Used where no recorded history exists yet, e.g. a one-off forecast from
//! the command line.

use rand::Rng;
use time::{Duration, OffsetDateTime};

use airwatch_types::HistoricalPoint;

/// Parameters for a synthetic series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticHistory {
    /// Centre value in ppm.
    pub base: f64,
    /// Peak-to-peak spread in ppm.
    pub variation: f64,
    /// Number of one-minute samples.
    pub points: usize,
}

impl Default for SyntheticHistory {
    fn default() -> Self {
        Self {
            base: 5.0,
            variation: 3.0,
            points: 60,
        }
    }
}

impl SyntheticHistory {
    /// Create parameters for a series.
    pub fn new(base: f64, variation: f64, points: usize) -> Self {
        Self {
            base,
            variation,
            points,
        }
    }

    /// Generate a series ending near `now` with the thread RNG.
    pub fn generate(&self, now: OffsetDateTime) -> Vec<HistoricalPoint> {
        self.generate_with(now, &mut rand::rng())
    }

    /// Generate a series with a caller-supplied RNG.
    ///
    /// Samples are one minute apart starting one hour before `now`. Each
    /// level is `base + (r - 0.5) * variation` for uniform `r` in `[0, 1)`,
    /// rounded to one decimal and clamped at zero.
    pub fn generate_with<R: Rng>(
        &self,
        now: OffsetDateTime,
        rng: &mut R,
    ) -> Vec<HistoricalPoint> {
        let start = now - Duration::hours(1);
        (0..self.points)
            .map(|i| {
                let r: f64 = rng.random();
                let level = self.base + (r - 0.5) * self.variation;
                HistoricalPoint {
                    timestamp: start + Duration::minutes(i as i64),
                    co_level: round1(level).max(0.0),
                }
            })
            .collect()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_series_spacing() {
        let now = OffsetDateTime::now_utc();
        let series = SyntheticHistory::default().generate(now);

        assert_eq!(series.len(), 60);
        assert_eq!(series[0].timestamp, now - Duration::hours(1));
        assert_eq!(series[59].timestamp, now - Duration::minutes(1));
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let now = OffsetDateTime::now_utc();
        let params = SyntheticHistory::new(12.0, 4.0, 10);
        let a = params.generate_with(now, &mut StdRng::seed_from_u64(7));
        let b = params.generate_with(now, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn levels_stay_in_band(
            base in 0.0f64..200.0,
            variation in 0.0f64..50.0,
            points in 0usize..120,
            seed in any::<u64>(),
        ) {
            let params = SyntheticHistory::new(base, variation, points);
            let series = params.generate_with(OffsetDateTime::now_utc(), &mut StdRng::seed_from_u64(seed));
            prop_assert_eq!(series.len(), points);
            for point in series {
                prop_assert!(point.co_level >= 0.0);
                prop_assert!(point.co_level <= base + variation / 2.0 + 0.05 + 1e-9);
                prop_assert!(point.co_level >= (base - variation / 2.0 - 0.05).max(0.0) - 1e-9);
                prop_assert_eq!(round1(point.co_level), point.co_level);
            }
        }
    }
}
