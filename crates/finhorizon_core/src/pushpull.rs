//! Push/pull balance maintenance (spec.md §4.8, scenario S6).
//!
//! After a month's segment has been fully processed, each account with a
//! push/pull policy is checked against its minimum balance. If it dipped
//! below the minimum, a retroactive transfer dated the first of that same
//! month is inserted (priority 1, so it lands ahead of everything else)
//! and the segment is replayed once. Accounts that close the month well
//! above their minimum may instead push the excess out to a linked
//! account.

use jiff::civil::Date;

use crate::date_math::fast_days_between;
use crate::model::account::{Account, PushPullPolicy};
use crate::model::ids::AccountId;
use crate::model::posting::Posting;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct MonthlyProjection {
    pub account: AccountId,
    pub lowest_balance: f64,
    pub lowest_date: Date,
    pub closing_balance: f64,
    pub days_below_minimum: i32,
    pub total_days: i32,
}

impl MonthlyProjection {
    /// Walk a month's committed postings for one account to find its
    /// lowest point and how many days it spent under `minimum`, starting
    /// from `starting_balance` (the account's balance as of `month_start`,
    /// carried forward even if no posting touches the account all month).
    #[must_use]
    pub fn from_postings(
        account: AccountId,
        postings: &[Posting],
        starting_balance: f64,
        month_start: Date,
        month_end: Date,
        minimum: f64,
    ) -> Self {
        let total_days = fast_days_between(month_start, month_end).max(1);
        let mut lowest_balance = f64::INFINITY;
        let mut lowest_date = month_start;
        let mut closing_balance;
        let mut days_below_minimum = 0;

        let mut sorted: Vec<&Posting> =
            postings.iter().filter(|p| p.date >= month_start && p.date < month_end).collect();
        sorted.sort_by_key(|p| p.date);

        let mut cursor = month_start;
        let mut running = starting_balance;
        for posting in &sorted {
            let span = fast_days_between(cursor, posting.date);
            if running < minimum {
                days_below_minimum += span;
            }
            running = posting.balance;
            if running < lowest_balance {
                lowest_balance = running;
                lowest_date = posting.date;
            }
            cursor = posting.date;
        }
        let tail = fast_days_between(cursor, month_end);
        if running < minimum {
            days_below_minimum += tail;
        }
        closing_balance = running;

        if lowest_balance.is_infinite() {
            lowest_balance = running;
        }

        MonthlyProjection {
            account,
            lowest_balance,
            lowest_date,
            closing_balance,
            days_below_minimum,
            total_days,
        }
    }
}

#[must_use]
pub fn classify_risk(projection: &MonthlyProjection) -> RiskLevel {
    let fraction = projection.days_below_minimum as f64 / projection.total_days as f64;
    if fraction <= 0.0 {
        RiskLevel::Low
    } else if fraction < 0.5 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

#[derive(Debug, Clone)]
pub struct PushPullDecision {
    pub account: AccountId,
    pub counterparty: AccountId,
    /// Positive: pull this much into `account` from `counterparty`.
    /// Negative: push this much out of `account` into `counterparty`.
    pub amount: f64,
    pub risk: RiskLevel,
}

/// What an account's policy calls for this month, before a counterparty
/// has been picked (spec.md §4.8 step 3). Pull amount is `shortfall +
/// minimumPullAmount`; push only fires once the closing balance clears
/// `minimum + 4*minimumPullAmount`, leaving headroom before the next
/// pull would trigger again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushPullAction {
    Pull { amount: f64, risk: RiskLevel },
    Push { amount: f64 },
}

/// Decide whether `account`'s policy calls for a pull or a push this
/// month, without yet choosing a counterparty (spec.md §4.8 steps 2-3).
/// The caller picks the pull source by priority across the whole
/// portfolio (see [`select_pull_source`]); a push always targets the
/// account's own configured `push_account`.
#[must_use]
pub fn decide_action(policy: &PushPullPolicy, projection: &MonthlyProjection) -> Option<PushPullAction> {
    let minimum = policy.minimum_balance.unwrap_or(0.0);
    let minimum_pull = policy.minimum_pull_amount.unwrap_or(0.0);

    if projection.lowest_balance < minimum && policy.performs_pulls {
        let shortfall = minimum - projection.lowest_balance;
        return Some(PushPullAction::Pull { amount: shortfall + minimum_pull, risk: classify_risk(projection) });
    }

    if policy.performs_pushes && projection.closing_balance - minimum - 4.0 * minimum_pull > 0.0 {
        let excess = projection.closing_balance - minimum - 4.0 * minimum_pull;
        return Some(PushPullAction::Push { amount: excess });
    }

    None
}

/// A candidate source account for a retroactive pull: its id, configured
/// `pullPriority`, current balance, and its own minimum balance.
#[derive(Debug, Clone)]
pub struct PullCandidate {
    pub account: AccountId,
    pub pull_priority: i32,
    pub balance: f64,
    pub minimum_balance: f64,
}

/// Pick the highest-priority account that can fund a pull of `amount`
/// (spec.md §4.8 step 3: "source = the highest-priority pullable account
/// {pullPriority >= 0, balance > itsMinimum + pullAmount}"). Lower
/// `pull_priority` values sort first, matching the ascending-priority
/// convention used for event ordering elsewhere in the engine.
#[must_use]
pub fn select_pull_source(candidates: &[PullCandidate], amount: f64) -> Option<AccountId> {
    candidates
        .iter()
        .filter(|c| c.pull_priority >= 0 && c.balance > c.minimum_balance + amount)
        .min_by_key(|c| c.pull_priority)
        .map(|c| c.account.clone())
}

/// Decide whether `account` needs a retroactive pull or can push out
/// excess, given its month's projection and policy, resolving the
/// counterparty in the same step. Kept for direct single-account
/// decisions (e.g. tests); `engine::run` uses [`decide_action`] plus
/// [`select_pull_source`] so a pull can draw from any pullable account in
/// the portfolio, not just the account's own configured `push_account`.
#[must_use]
pub fn decide(account: &Account, policy: &PushPullPolicy, projection: &MonthlyProjection) -> Option<PushPullDecision> {
    match decide_action(policy, projection)? {
        PushPullAction::Pull { amount, risk } => {
            let counterparty = policy.push_account.clone()?;
            Some(PushPullDecision { account: account.id.clone(), counterparty, amount, risk })
        }
        PushPullAction::Push { amount } => {
            let counterparty = policy.push_account.clone()?;
            Some(PushPullDecision { account: account.id.clone(), counterparty, amount: -amount, risk: RiskLevel::Low })
        }
    }
}
