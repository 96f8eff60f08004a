//! Shared builders for the integration tests in this module.

use jiff::civil::Date;

use crate::cache::{SegmentCache, DEFAULT_BYTE_BUDGET};
use crate::config::{AccountsAndTransfers, CalculationOptions};
use crate::model::account::{Account, AccountType};
use crate::model::ids::{AccountId, EventId};
use crate::model::posting::Posting;
use crate::rates::StaticRateSeriesSource;
use crate::variables::StaticVariableStore;

#[must_use]
pub fn bare_account(id: &str, account_type: AccountType) -> Account {
    Account {
        id: AccountId::new(id),
        name: id.to_string(),
        account_type,
        activity: Vec::new(),
        bills: Vec::new(),
        interests: Vec::new(),
        push_pull: None,
        retirement: None,
        pension: None,
        social_security: None,
    }
}

/// An `Opening Balance` activity posting, dated ahead of whatever else the
/// scenario schedules so it's unambiguously the account's first posting.
#[must_use]
pub fn opening_balance(account: &str, amount: f64, date: Date) -> Posting {
    Posting {
        id: EventId::new(format!("{account}:opening")),
        name: "Opening Balance".to_string(),
        account: AccountId::new(account),
        amount,
        date,
        category: "opening_balance".to_string(),
        from: None,
        to: None,
        is_transfer: false,
        flag: None,
        flag_color: None,
        bill_id: None,
        interest_id: None,
        first_bill: false,
        first_interest: false,
        balance: 0.0,
    }
}

#[must_use]
pub fn document(accounts: Vec<Account>) -> AccountsAndTransfers {
    AccountsAndTransfers { accounts, transfers: Default::default() }
}

#[must_use]
pub fn options(end_date: Date) -> CalculationOptions {
    CalculationOptions {
        start_date: None,
        end_date,
        monte_carlo: false,
        simulation_number: 0,
        total_simulations: 1,
        force_recalculation: false,
    }
}

#[must_use]
pub fn no_rates() -> StaticRateSeriesSource {
    StaticRateSeriesSource::new()
}

#[must_use]
pub fn no_variables() -> StaticVariableStore {
    StaticVariableStore::new()
}

/// Every test gets its own cache directory under the system temp dir so
/// parallel test threads never race on the same blob files.
#[must_use]
pub fn fresh_cache(name: &str) -> SegmentCache {
    let dir = std::env::temp_dir().join(format!("finhorizon_core_test_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    SegmentCache::new(dir, DEFAULT_BYTE_BUDGET)
}
