//! Periodic balance-tracker snapshots used to short-circuit replay after a
//! cache hit (spec.md §4.6, §4.9).

use jiff::civil::Date;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::model::ids::{AccountId, EventId, ScheduleId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestState {
    pub current_interest: f64,
    pub interest_index: u32,
    pub next_interest_date: Date,
    pub accumulated_taxable_interest: f64,
}

/// Point-in-time capture of everything the balance tracker needs to
/// resume processing without replaying from the start of the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: Date,
    pub balances: FxHashMap<AccountId, f64>,
    pub activity_indices: FxHashMap<AccountId, usize>,
    pub interest_states: FxHashMap<ScheduleId, InterestState>,
    pub data_hash: String,
    pub processed_event_ids: FxHashSet<EventId>,
}
