//! Defined-benefit pension schedule inputs (spec.md §4.7).

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::model::ids::{AccountId, ScheduleId};

/// Declarative pension benefit, paid monthly into `deposit_account` once
/// `start_date` is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PensionSchedule {
    pub id: ScheduleId,
    pub deposit_account: AccountId,
    pub employee_dob: Date,
    pub start_date: Date,
    /// Average of the highest `averaging_years` years of compensation.
    pub highest_compensation_average: f64,
    pub accrual_factor: f64,
    pub years_worked: f64,
    /// Percentage reduction applied for collecting before the plan's
    /// normal retirement age (0.0 if collecting at or after it).
    pub reduction_factor: f64,
}

impl PensionSchedule {
    /// Monthly benefit: `avg_comp * accrual_factor * years_worked *
    /// (1 - reduction_factor) / 12` (spec.md §4.7).
    #[must_use]
    pub fn monthly_benefit(&self) -> f64 {
        self.highest_compensation_average * self.accrual_factor * self.years_worked
            * (1.0 - self.reduction_factor)
            / 12.0
    }
}
