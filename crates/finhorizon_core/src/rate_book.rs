//! Deterministic-or-drawn per-year rates (spec.md §4.1).
//!
//! In a deterministic run `rate_for_year` returns the historical
//! observation if one exists, else the series mean. In a Monte-Carlo run
//! it draws from a normal distribution around the series mean/std-dev,
//! memoizing the draw per `(year, variable)` so every schedule that
//! references the same macro variable in the same year sees the same
//! draw within one simulation (spec.md §6 "per-run macro-rate draws,
//! memoized per (year, variable)").

use std::cell::RefCell;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal};
use rustc_hash::FxHashMap;

use crate::rates::{IndexSeries, RateSeries, RateSeriesSource, RateVariable};

pub struct RateBook<'a> {
    source: &'a dyn RateSeriesSource,
    rng: Option<RefCell<SmallRng>>,
    memo: RefCell<FxHashMap<(i16, String), f64>>,
}

impl<'a> RateBook<'a> {
    /// A deterministic rate book: always returns the historical rate or
    /// series mean, never draws.
    #[must_use]
    pub fn deterministic(source: &'a dyn RateSeriesSource) -> Self {
        Self { source, rng: None, memo: RefCell::new(FxHashMap::default()) }
    }

    /// A Monte-Carlo rate book seeded for one simulation run. Two
    /// `RateBook`s built from the same `seed` draw identical sequences,
    /// which is what makes a specific simulation number reproducible
    /// (spec.md §6).
    #[must_use]
    pub fn monte_carlo(source: &'a dyn RateSeriesSource, seed: u64) -> Self {
        Self {
            source,
            rng: Some(RefCell::new(SmallRng::seed_from_u64(seed))),
            memo: RefCell::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn rate_for_year(&self, variable: &RateVariable, year: i16) -> f64 {
        let key = (year, variable.key());
        if let Some(cached) = self.memo.borrow().get(&key) {
            return *cached;
        }

        let series = self.source.series(variable);
        let rate = match (&self.rng, series) {
            (None, Some(s)) => s.rate_for_year(year).unwrap_or_else(|| s.mean_growth()),
            (None, None) => 0.0,
            (Some(rng), Some(s)) => Self::draw(rng, s),
            (Some(rng), None) => Self::draw(rng, &RateSeries::default()),
        };

        self.memo.borrow_mut().insert(key, rate);
        rate
    }

    /// The caller-supplied SSA Average Wage Index, passed straight through
    /// from the underlying source — it's extrapolated deterministically
    /// (spec.md §4.7), never drawn, even in a Monte-Carlo run.
    #[must_use]
    pub fn average_wage_index(&self) -> Option<&IndexSeries> {
        self.source.average_wage_index()
    }

    /// The caller-supplied Social Security bend-point series, passed
    /// through the same way as [`Self::average_wage_index`].
    #[must_use]
    pub fn bend_points(&self) -> Option<(&IndexSeries, &IndexSeries)> {
        self.source.bend_points()
    }

    fn draw(rng: &RefCell<SmallRng>, series: &RateSeries) -> f64 {
        let mean = series.mean_growth();
        let std_dev = series.std_dev();
        if std_dev <= 0.0 {
            return mean;
        }
        let normal = Normal::new(mean, std_dev).expect("finite mean/std_dev");
        normal.sample(&mut *rng.borrow_mut())
    }
}
