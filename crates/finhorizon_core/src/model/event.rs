//! The expanded, totally-ordered event stream (spec.md §4.3, §4.4).

use jiff::civil::Date;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::model::amount::Amount;
use crate::model::ids::{AccountId, EventId, ScheduleId};
use crate::model::pension::PensionSchedule;
use crate::model::social_security::SocialSecuritySchedule;

/// Event kinds, carrying the sort priority spec.md §4.4/§5 assigns each
/// (lower priority sorts first within the same date). Retroactive
/// push/pull insertions reuse `Activity`'s priority of 1 so they sort
/// ahead of everything else on the first of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Activity,
    Bill,
    Transfer,
    Interest,
    Pension,
    SocialSecurity,
    Tax,
    Rmd,
    MonthEndCheck,
}

impl EventKind {
    #[must_use]
    pub fn priority(self) -> i32 {
        match self {
            EventKind::Activity => 1,
            EventKind::Bill => 2,
            EventKind::Transfer => 3,
            EventKind::Interest => 4,
            EventKind::Pension => 5,
            EventKind::SocialSecurity => 6,
            EventKind::Tax => 7,
            EventKind::Rmd => 8,
            EventKind::MonthEndCheck => 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Activity {
        name: String,
        amount: f64,
        category: String,
        flag: Option<String>,
    },
    Bill {
        bill_id: ScheduleId,
        name: String,
        amount: Amount,
        category: String,
        flag: Option<String>,
        is_first: bool,
    },
    Interest {
        interest_id: ScheduleId,
        apr: f64,
        compounded: crate::date_math::Period,
        is_first: bool,
    },
    Transfer {
        schedule_id: Option<ScheduleId>,
        name: String,
        amount: Amount,
        category: String,
        from: AccountId,
        to: AccountId,
        is_first: bool,
        /// Set for retroactive push/pull insertions so `calculator` can
        /// skip the usual token-resolution path (the amount is already
        /// a concrete number computed by `pushpull`).
        retroactive: bool,
    },
    Pension {
        schedule: PensionSchedule,
    },
    SocialSecurity {
        schedule: SocialSecuritySchedule,
    },
    Tax,
    Rmd,
    MonthEndCheck,
}

/// A single node in the expanded event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub date: Date,
    pub primary_account_id: AccountId,
    pub priority: i32,
    /// Whether this event's result may be reused from a cached segment.
    /// Events whose amount depends on a variable unresolved at expansion
    /// time (or on another event's runtime output, e.g. token transfers)
    /// are marked non-cacheable.
    pub cacheable: bool,
    pub dependencies: FxHashSet<AccountId>,
    pub payload: EventPayload,
}

impl Event {
    /// Whether this is the synthetic Opening Balance activity posting.
    /// Opening Balance must sort before every other event on its date
    /// regardless of priority (spec.md §4.4 invariant 5), including other
    /// priority-1 events such as a same-date retroactive push/pull
    /// insertion, so it needs its own tie-break ahead of `priority`.
    #[must_use]
    pub fn is_opening_balance(&self) -> bool {
        matches!(&self.payload, EventPayload::Activity { name, .. } if name == "Opening Balance")
    }

    #[must_use]
    pub fn sort_key(&self) -> (Date, bool, i32, &str) {
        (self.date, !self.is_opening_balance(), self.priority, self.id.as_str())
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
