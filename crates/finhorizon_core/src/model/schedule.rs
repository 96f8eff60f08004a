//! Declarative recurring schedules — bills, interest, and transfers
//! (spec.md §3, §4.2).

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::date_math::Period;
use crate::model::amount::Amount;
use crate::model::ids::{AccountId, ScheduleId};

/// A recurring charge or credit against the account that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: ScheduleId,
    pub name: String,
    pub amount: Amount,
    /// Variable lookup name overriding `amount` when present (e.g. a
    /// COLA-linked benefit); resolved once per anniversary against the
    /// caller-supplied variable store.
    pub amount_variable: Option<String>,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub period: Period,
    #[serde(default = "one")]
    pub every_n: u32,
    /// Fractional increase applied every `increase_by_periods` periods
    /// (e.g. annual inflation).
    pub increase_by: Option<f64>,
    #[serde(default = "one")]
    pub increase_by_periods: u32,
    /// Fixed anniversary date the increase snaps to, overriding the
    /// natural every-N-periods anchor (spec.md §4.1 anchor-date rule).
    pub increase_by_date: Option<Date>,
    pub increase_by_variable: Option<String>,
    /// Round the post-increase amount up to the nearest multiple of this
    /// value (scenario S1).
    pub ceiling_multiple: Option<f64>,
    #[serde(default)]
    pub category: String,
    pub flag: Option<String>,
    #[serde(default)]
    pub is_transfer: bool,
    pub from: Option<AccountId>,
    pub to: Option<AccountId>,
}

fn one() -> u32 {
    1
}

/// A recurring transfer between two accounts. Same declarative shape as
/// [`Bill`] plus the mandatory `from`/`to` legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: ScheduleId,
    pub name: String,
    pub amount: Amount,
    pub amount_variable: Option<String>,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub period: Period,
    #[serde(default = "one")]
    pub every_n: u32,
    pub increase_by: Option<f64>,
    #[serde(default = "one")]
    pub increase_by_periods: u32,
    pub increase_by_date: Option<Date>,
    pub increase_by_variable: Option<String>,
    pub ceiling_multiple: Option<f64>,
    #[serde(default)]
    pub category: String,
    pub flag: Option<String>,
    pub from: AccountId,
    pub to: AccountId,
}

/// Recurring interest accrual attached to an account (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub id: ScheduleId,
    pub apr: f64,
    #[serde(default)]
    pub apr_is_variable: bool,
    pub apr_variable: Option<String>,
    pub compounded: Period,
    pub applicable_date: Date,
    pub end_date: Option<Date>,
}
