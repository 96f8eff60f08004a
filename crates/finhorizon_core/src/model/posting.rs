//! Consolidated activity — the posted, balance-affecting output of a
//! processed event (spec.md §3).

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::model::ids::{AccountId, EventId, ScheduleId};

/// A single posted entry against an account's ledger. Both one-off
/// `activity` entries supplied by the caller and schedule-generated
/// postings share this shape once they're realised onto the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: EventId,
    pub name: String,
    /// The account whose ledger this posting affects. For a transfer leg
    /// this is one side of the move; `from`/`to` below carry the other
    /// side purely as display metadata.
    pub account: AccountId,
    pub amount: f64,
    pub date: Date,
    #[serde(default)]
    pub category: String,
    pub from: Option<AccountId>,
    pub to: Option<AccountId>,
    #[serde(default)]
    pub is_transfer: bool,
    pub flag: Option<String>,
    pub flag_color: Option<String>,
    pub bill_id: Option<ScheduleId>,
    pub interest_id: Option<ScheduleId>,
    #[serde(default)]
    pub first_bill: bool,
    #[serde(default)]
    pub first_interest: bool,
    /// Running balance of the owning account immediately after this
    /// posting; filled in by the balance tracker, not the caller.
    #[serde(default)]
    pub balance: f64,
}
