//! Accounts and the policies attached to them (spec.md §3).

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::model::ids::AccountId;
use crate::model::pension::PensionSchedule;
use crate::model::posting::Posting;
use crate::model::schedule::{Bill, Interest};
use crate::model::social_security::SocialSecuritySchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Checking,
    Savings,
    CreditCard,
    #[serde(rename = "401k")]
    FourOhOneK,
    Ira,
    RothIra,
    Pension,
    Investment,
    Other,
}

impl AccountType {
    /// Credit-card accounts are allowed a negative balance; the tracker's
    /// minimum-balance check (spec.md §4.6) is skipped for them.
    #[must_use]
    pub fn allows_negative_balance(&self) -> bool {
        matches!(self, AccountType::CreditCard)
    }

    /// Tax-deferred accounts (401k/IRA/pension) don't accrue taxable
    /// interest the way a brokerage or savings account does (spec.md §4.7
    /// Interest handler).
    #[must_use]
    pub fn is_tax_deferred(&self) -> bool {
        matches!(
            self,
            AccountType::FourOhOneK | AccountType::Ira | AccountType::Pension
        )
    }
}

/// Push/pull minimum-balance policy attached to an account (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPullPolicy {
    pub minimum_balance: Option<f64>,
    pub minimum_pull_amount: Option<f64>,
    #[serde(default)]
    pub performs_pulls: bool,
    #[serde(default)]
    pub performs_pushes: bool,
    pub push_account: Option<AccountId>,
    #[serde(default)]
    pub pull_priority: i32,
    pub push_start: Option<Date>,
    pub push_end: Option<Date>,
}

/// Retirement-account attributes driving RMD and early-withdrawal handling
/// (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetirementAttributes {
    #[serde(default)]
    pub uses_rmd: bool,
    pub rmd_account: Option<AccountId>,
    pub account_owner_dob: Option<Date>,
    pub withdrawal_tax_rate: Option<f64>,
    pub early_withdrawal_date: Option<Date>,
    pub early_withdrawal_penalty_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub activity: Vec<Posting>,
    #[serde(default)]
    pub bills: Vec<Bill>,
    #[serde(default)]
    pub interests: Vec<Interest>,
    pub push_pull: Option<PushPullPolicy>,
    pub retirement: Option<RetirementAttributes>,
    pub pension: Option<PensionSchedule>,
    pub social_security: Option<SocialSecuritySchedule>,
}

impl Account {
    #[must_use]
    pub fn minimum_balance(&self) -> f64 {
        if self.account_type.allows_negative_balance() {
            f64::NEG_INFINITY
        } else {
            self.push_pull
                .as_ref()
                .and_then(|p| p.minimum_balance)
                .unwrap_or(0.0)
        }
    }
}
