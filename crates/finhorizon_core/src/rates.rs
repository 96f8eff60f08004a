//! Caller-supplied historical rate data (spec.md §4.1 "Rate book" inputs).
//!
//! The engine never hardcodes economic assumptions; callers hand in
//! historical series for the five named macro variables plus whatever
//! investment sub-series their accounts reference. `rate_book` turns this
//! raw data into deterministic-or-drawn per-year rates.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One of the five named macro variables schedules may reference, or an
/// arbitrary named investment sub-series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateVariable {
    Inflation,
    Raise,
    Limit401kIncrease,
    MortgageIncrease,
    Investment(String),
}

impl RateVariable {
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            RateVariable::Inflation => "inflation".to_string(),
            RateVariable::Raise => "raise".to_string(),
            RateVariable::Limit401kIncrease => "401k_limit_increase".to_string(),
            RateVariable::MortgageIncrease => "mortgage_increase".to_string(),
            RateVariable::Investment(name) => format!("investment:{name}"),
        }
    }
}

/// A historical annual-rate series, e.g. CPI inflation 1990-2024.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateSeries {
    /// Calendar year -> observed annual rate (e.g. `0.032` for 3.2%).
    pub observed: FxHashMap<i16, f64>,
}

impl RateSeries {
    #[must_use]
    pub fn rate_for_year(&self, year: i16) -> Option<f64> {
        self.observed.get(&year).copied()
    }

    /// Arithmetic mean across all observed years, used both to extrapolate
    /// a deterministic rate for years past the historical record and as
    /// the draw mean for Monte-Carlo simulation.
    #[must_use]
    pub fn mean_growth(&self) -> f64 {
        if self.observed.is_empty() {
            return 0.0;
        }
        self.observed.values().sum::<f64>() / self.observed.len() as f64
    }

    /// Population standard deviation of the observed series, the draw
    /// width for Monte-Carlo sampling.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.observed.len() < 2 {
            return 0.0;
        }
        let mean = self.mean_growth();
        let variance = self
            .observed
            .values()
            .map(|r| (r - mean).powi(2))
            .sum::<f64>()
            / self.observed.len() as f64;
        variance.sqrt()
    }
}

/// A year -> absolute index-level series, as opposed to `RateSeries`'s
/// year -> growth rate. Used for the SSA Average Wage Index and the two
/// Social Security PIA bend-point dollar amounts (spec.md §4.7), both of
/// which are levels read directly at a given year rather than rates
/// compounded from a base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSeries {
    /// Calendar year -> index level (e.g. the AWI value, or a bend-point
    /// dollar amount, for that year).
    pub observed: FxHashMap<i16, f64>,
}

impl IndexSeries {
    #[must_use]
    pub fn value_for_year(&self, year: i16) -> Option<f64> {
        self.observed.get(&year).copied()
    }

    /// Mean year-over-year growth across consecutive observed years, the
    /// rate used to extrapolate the index beyond the last known year
    /// (spec.md §4.7: "AWI ... extrapolated beyond the last known year by
    /// the historical mean year-over-year growth"; bend points the same).
    #[must_use]
    pub fn mean_growth(&self) -> f64 {
        let mut years: Vec<i16> = self.observed.keys().copied().collect();
        years.sort_unstable();
        let growths: Vec<f64> = years
            .windows(2)
            .filter_map(|pair| {
                let (prev, next) = (self.observed[&pair[0]], self.observed[&pair[1]]);
                if prev != 0.0 { Some(next / prev - 1.0) } else { None }
            })
            .collect();
        if growths.is_empty() { 0.0 } else { growths.iter().sum::<f64>() / growths.len() as f64 }
    }

    /// The index's value at `year`: the observed level if one exists,
    /// else extrapolated from the nearest known year by `mean_growth()`.
    /// Years before the earliest observation hold at the earliest known
    /// level (there's nothing earlier to extrapolate from).
    #[must_use]
    pub fn value_or_extrapolate(&self, year: i16) -> f64 {
        if let Some(v) = self.value_for_year(year) {
            return v;
        }
        let Some(&latest) = self.observed.keys().max() else { return 0.0 };
        let Some(&earliest) = self.observed.keys().min() else { return 0.0 };
        if year < earliest {
            return self.observed[&earliest];
        }
        let growth = self.mean_growth();
        let years_ahead = i32::from(year) - i32::from(latest);
        self.observed[&latest] * (1.0 + growth).powi(years_ahead.max(0))
    }
}

/// Source of historical rate series, injected by the caller so the engine
/// never embeds economic assumptions itself.
pub trait RateSeriesSource: Send + Sync {
    fn series(&self, variable: &RateVariable) -> Option<&RateSeries>;

    /// SSA Average Wage Index, year -> index level, used to wage-index
    /// pre-age-60 earnings when computing AIME (spec.md §4.7). `None`
    /// means the caller supplied no AWI data; AIME then falls back to raw
    /// (unindexed) earnings.
    fn average_wage_index(&self) -> Option<&IndexSeries> {
        None
    }

    /// The two Social Security PIA bend points as year -> dollar amount
    /// series (spec.md §4.7 "bend points bp1,bp2 taken at yearTurn62").
    /// `None` means the caller supplied no bend-point data.
    fn bend_points(&self) -> Option<(&IndexSeries, &IndexSeries)> {
        None
    }
}

/// Reference `RateSeriesSource` backed by an in-memory map, suitable for
/// tests and for callers who've already loaded their series into memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRateSeriesSource {
    series: FxHashMap<String, RateSeries>,
    average_wage_index: Option<IndexSeries>,
    bend_point_1: Option<IndexSeries>,
    bend_point_2: Option<IndexSeries>,
}

impl StaticRateSeriesSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_series(mut self, variable: RateVariable, series: RateSeries) -> Self {
        self.series.insert(variable.key(), series);
        self
    }

    #[must_use]
    pub fn with_average_wage_index(mut self, series: IndexSeries) -> Self {
        self.average_wage_index = Some(series);
        self
    }

    #[must_use]
    pub fn with_bend_points(mut self, bend_point_1: IndexSeries, bend_point_2: IndexSeries) -> Self {
        self.bend_point_1 = Some(bend_point_1);
        self.bend_point_2 = Some(bend_point_2);
        self
    }
}

impl RateSeriesSource for StaticRateSeriesSource {
    fn series(&self, variable: &RateVariable) -> Option<&RateSeries> {
        self.series.get(&variable.key())
    }

    fn average_wage_index(&self) -> Option<&IndexSeries> {
        self.average_wage_index.as_ref()
    }

    fn bend_points(&self) -> Option<(&IndexSeries, &IndexSeries)> {
        Some((self.bend_point_1.as_ref()?, self.bend_point_2.as_ref()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[(i16, f64)]) -> RateSeries {
        RateSeries { observed: values.iter().copied().collect() }
    }

    #[test]
    fn mean_growth_averages_observed_years() {
        let s = series(&[(2020, 0.01), (2021, 0.03), (2022, 0.05)]);
        assert!((s.mean_growth() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn std_dev_is_zero_for_constant_series() {
        let s = series(&[(2020, 0.02), (2021, 0.02), (2022, 0.02)]);
        assert!(s.std_dev().abs() < 1e-9);
    }

    #[test]
    fn static_source_round_trips_by_key() {
        let src = StaticRateSeriesSource::new()
            .with_series(RateVariable::Inflation, series(&[(2020, 0.02)]));
        assert!(src.series(&RateVariable::Inflation).is_some());
        assert!(src.series(&RateVariable::Raise).is_none());
    }

    fn index_series(values: &[(i16, f64)]) -> IndexSeries {
        IndexSeries { observed: values.iter().copied().collect() }
    }

    #[test]
    fn index_series_returns_observed_value_exactly() {
        let s = index_series(&[(2028, 55_000.0), (2029, 56_000.0)]);
        assert_eq!(s.value_for_year(2029), Some(56_000.0));
        assert_eq!(s.value_or_extrapolate(2029), 56_000.0);
    }

    #[test]
    fn index_series_extrapolates_beyond_last_known_year_by_mean_growth() {
        // 2020 -> 100, 2021 -> 110 (10% growth), 2022 -> 121 (10% growth).
        let s = index_series(&[(2020, 100.0), (2021, 110.0), (2022, 121.0)]);
        assert!((s.mean_growth() - 0.10).abs() < 1e-9);
        let extrapolated = s.value_or_extrapolate(2024);
        assert!((extrapolated - 121.0 * 1.10 * 1.10).abs() < 1e-6);
    }

    #[test]
    fn index_series_holds_earliest_value_before_the_record_starts() {
        let s = index_series(&[(2020, 100.0), (2021, 110.0)]);
        assert_eq!(s.value_or_extrapolate(2010), 100.0);
    }

    #[test]
    fn static_source_exposes_bend_points_only_when_both_are_set() {
        let src = StaticRateSeriesSource::new();
        assert!(src.bend_points().is_none());

        let src = src.with_bend_points(index_series(&[(2030, 1_115.0)]), index_series(&[(2030, 6_721.0)]));
        let (bp1, bp2) = src.bend_points().expect("both bend points set");
        assert_eq!(bp1.value_for_year(2030), Some(1_115.0));
        assert_eq!(bp2.value_for_year(2030), Some(6_721.0));
    }
}
