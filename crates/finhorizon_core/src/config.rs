//! The calculation's input document, options, and result types (spec.md
//! §3, §4.9, §6).

use jiff::civil::Date;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::metrics::CalculationMetrics;
use crate::model::account::{Account, AccountType};
use crate::model::ids::AccountId;
use crate::model::posting::Posting;
use crate::model::schedule::Transfer;

/// Recurring and one-off transfers declared outside any single account
/// (spec.md §3: "transfers: { activity, bills }").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransfersDocument {
    #[serde(default)]
    pub activity: Vec<Posting>,
    #[serde(default)]
    pub bills: Vec<Transfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsAndTransfers {
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub transfers: TransfersDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationOptions {
    pub start_date: Option<Date>,
    pub end_date: Date,
    #[serde(default)]
    pub monte_carlo: bool,
    #[serde(default)]
    pub simulation_number: u32,
    #[serde(default = "one")]
    pub total_simulations: u32,
    #[serde(default)]
    pub force_recalculation: bool,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResult {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub postings: Vec<Posting>,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationMetadata {
    pub simulation_number: u32,
    pub total_simulations: u32,
    pub start_date: Date,
    pub end_date: Date,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub success: bool,
    pub error: Option<String>,
    pub accounts: Vec<AccountResult>,
    pub final_balances: FxHashMap<AccountId, f64>,
    pub metrics: CalculationMetrics,
    pub metadata: CalculationMetadata,
}

impl CalculationResult {
    #[must_use]
    pub fn failed(error: impl Into<String>, metadata: CalculationMetadata) -> Self {
        CalculationResult {
            success: false,
            error: Some(error.into()),
            accounts: Vec::new(),
            final_balances: FxHashMap::default(),
            metrics: CalculationMetrics::default(),
            metadata,
        }
    }
}
