//! Social Security benefit schedule inputs (spec.md §4.7, scenario S4).
//!
//! Benefit amounts themselves are computed in `calculator`; this module
//! only holds the declarative schedule and the reference tables
//! (bend-point percentages, collection-age factors) the calculator reads
//! from a [`crate::rates::RateSeriesSource`].

use jiff::civil::Date;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::model::ids::{AccountId, ScheduleId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialSecuritySchedule {
    pub id: ScheduleId,
    pub deposit_account: AccountId,
    pub employee_dob: Date,
    /// Age (years, whole months) at which the employee elects to start
    /// collecting; must lie within [62y0m, 70y0m].
    pub collection_age_years: u32,
    pub collection_age_months: u32,
    /// Historical covered earnings by calendar year, used for AIME.
    pub earnings_history: FxHashMap<i16, f64>,
}

/// The three bend-point percentages applied to AIME (first bend, second
/// bend, remainder) — fixed by statute, not indexed.
pub const PIA_PERCENTAGES: [f64; 3] = [0.90, 0.32, 0.15];

/// Full retirement age in whole months, by birth year, per the Social
/// Security Administration's phased schedule (1943-1954 -> 66y0m, rising
/// two months per year thereafter until 67y0m for 1960+).
#[must_use]
pub fn full_retirement_age_months(birth_year: i16) -> u32 {
    match birth_year {
        y if y <= 1954 => 66 * 12,
        1955 => 66 * 12 + 2,
        1956 => 66 * 12 + 4,
        1957 => 66 * 12 + 6,
        1958 => 66 * 12 + 8,
        1959 => 66 * 12 + 10,
        _ => 67 * 12,
    }
}

/// Benefit factor relative to the PIA for collecting at `age_months`
/// rather than at the full retirement age (spec.md §4.7 "collection-age
/// factor table"): -5/9 of 1% per month for up to 36 months early,
/// -5/12 of 1% per month beyond that, +2/3 of 1% per month delayed up to
/// age 70.
#[must_use]
pub fn collection_age_factor(age_months: u32, fra_months: u32) -> f64 {
    if age_months >= fra_months {
        let delayed = (age_months - fra_months).min(70 * 12 - fra_months);
        1.0 + delayed as f64 * (2.0 / 3.0 / 100.0)
    } else {
        let early = fra_months - age_months;
        let first_36 = early.min(36);
        let remainder = early.saturating_sub(36);
        1.0 - first_36 as f64 * (5.0 / 9.0 / 100.0) - remainder as f64 * (5.0 / 12.0 / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_is_one_at_full_retirement_age() {
        let fra = full_retirement_age_months(1960);
        assert!((collection_age_factor(fra, fra) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn factor_reduces_for_early_collection() {
        let fra = full_retirement_age_months(1960);
        let at_62 = collection_age_factor(62 * 12, fra);
        assert!(at_62 < 1.0, "collecting at 62 should reduce the benefit below PIA");
    }

    #[test]
    fn factor_increases_for_delayed_collection() {
        let fra = full_retirement_age_months(1960);
        let at_70 = collection_age_factor(70 * 12, fra);
        assert!(at_70 > 1.0, "delaying to 70 should increase the benefit above PIA");
    }
}
