//! Per-event handlers (spec.md §4.7): pure functions from "one event plus
//! the tracker's current state" to a [`SegmentDelta`]. Handlers never
//! mutate the tracker themselves — `engine` applies the delta they
//! return, which keeps every handler trivially testable in isolation.

use rustc_hash::FxHashMap;

use crate::date_math::age_in_years;
use crate::model::account::{Account, AccountType};
use crate::model::amount::Amount;
use crate::model::event::{Event, EventKind, EventPayload};
use crate::model::ids::AccountId;
use crate::model::posting::Posting;
use crate::model::rmd;
use crate::model::social_security::{self, PIA_PERCENTAGES};
use crate::rate_book::RateBook;
use crate::rates::RateVariable;
use crate::tracker::{BalanceTracker, SegmentDelta};
use crate::variables::{VariableStore, VariableValue};

/// Base-year (2024) Social Security bend points in monthly dollars,
/// escalated year over year by the `Raise` rate series as a stand-in for
/// true Average Wage Index growth.
pub const BASE_BEND_POINT_1: f64 = 1_174.0;
pub const BASE_BEND_POINT_2: f64 = 7_078.0;
pub const BEND_POINT_BASE_YEAR: i16 = 2024;

/// Fallback marginal rate applied to taxable interest when an account
/// doesn't declare its own `withdrawal_tax_rate`.
pub const DEFAULT_TAX_RATE: f64 = 0.22;

pub struct CalculationContext<'a> {
    pub simulation_label: &'a str,
    pub rate_book: &'a RateBook<'a>,
    pub variables: &'a dyn VariableStore,
    pub accounts: &'a FxHashMap<AccountId, Account>,
}

impl<'a> CalculationContext<'a> {
    fn resolve_amount(&self, amount: &Amount, destination_balance: f64) -> f64 {
        amount.resolve(destination_balance)
    }

    fn lookup_variable_amount(&self, name: &str) -> Option<f64> {
        match self.variables.lookup(name, self.simulation_label)? {
            VariableValue::Amount(a) => a.as_number(),
            VariableValue::Date(_) => None,
        }
    }
}

pub fn process_event(event: &Event, tracker: &BalanceTracker, ctx: &CalculationContext) -> SegmentDelta {
    match &event.payload {
        EventPayload::Activity { name, amount, category, flag } => {
            activity(event, name, *amount, category, flag)
        }
        EventPayload::Bill { bill_id, name, amount, category, flag, is_first } => {
            bill(event, bill_id, *is_first, name, amount, category, flag, ctx)
        }
        EventPayload::Interest { interest_id, apr, compounded, is_first: _ } => {
            interest(event, interest_id, *apr, *compounded, tracker, ctx)
        }
        EventPayload::Transfer { schedule_id: _, name, amount, category, from, to, is_first: _, retroactive } => {
            transfer(event, name, amount, category, from, to, *retroactive, tracker)
        }
        EventPayload::Pension { schedule } => pension(event, schedule),
        EventPayload::SocialSecurity { schedule } => social_security_benefit(event, schedule, ctx),
        EventPayload::Tax => tax(event, tracker, ctx),
        EventPayload::Rmd => rmd_distribution(event, tracker, ctx),
        EventPayload::MonthEndCheck => SegmentDelta::default(),
    }
}

fn activity(event: &Event, name: &str, amount: f64, category: &str, flag: &Option<String>) -> SegmentDelta {
    let posting = Posting {
        id: event.id.clone(),
        name: name.to_string(),
        account: event.primary_account_id.clone(),
        amount,
        date: event.date,
        category: category.to_string(),
        from: None,
        to: None,
        is_transfer: false,
        flag: flag.clone(),
        flag_color: None,
        bill_id: None,
        interest_id: None,
        first_bill: false,
        first_interest: false,
        balance: 0.0,
    };
    SegmentDelta { postings: vec![posting], interest_state_updates: FxHashMap::default(), warnings: Vec::new() }
}

fn bill(
    event: &Event,
    bill_id: &crate::model::ScheduleId,
    is_first: bool,
    name: &str,
    amount: &Amount,
    category: &str,
    flag: &Option<String>,
    ctx: &CalculationContext,
) -> SegmentDelta {
    let own_balance = 0.0; // bills never reference their own account via a token amount
    let resolved = ctx.resolve_amount(amount, own_balance);
    let posting = Posting {
        id: event.id.clone(),
        name: name.to_string(),
        account: event.primary_account_id.clone(),
        amount: resolved,
        date: event.date,
        category: category.to_string(),
        from: None,
        to: None,
        is_transfer: false,
        flag: flag.clone(),
        flag_color: None,
        bill_id: Some(bill_id.clone()),
        interest_id: None,
        first_bill: is_first,
        first_interest: false,
        balance: 0.0,
    };
    SegmentDelta { postings: vec![posting], interest_state_updates: FxHashMap::default(), warnings: Vec::new() }
}

fn periods_per_year(period: crate::date_math::Period) -> f64 {
    match period {
        crate::date_math::Period::Day => 365.0,
        crate::date_math::Period::Week => 52.0,
        crate::date_math::Period::Month => 12.0,
        crate::date_math::Period::Year => 1.0,
    }
}

/// Interest accrual: skip postings smaller than a cent-thousandth to
/// avoid flooding the ledger with near-zero entries on small balances
/// (spec.md §4.7 "skip when |delta| < 1e-5"). Taxable interest only
/// accumulates for accounts that aren't tax-deferred.
fn interest(
    event: &Event,
    interest_id: &crate::model::ScheduleId,
    apr: f64,
    compounded: crate::date_math::Period,
    tracker: &BalanceTracker,
    ctx: &CalculationContext,
) -> SegmentDelta {
    let balance = tracker.balance(&event.primary_account_id);
    let accrued = balance * apr / periods_per_year(compounded);

    if accrued.abs() < 1e-5 {
        return SegmentDelta::default();
    }

    let account_type = ctx
        .accounts
        .get(&event.primary_account_id)
        .map(|a| a.account_type)
        .unwrap_or(AccountType::Other);

    let mut state = tracker
        .interest_state(interest_id)
        .cloned()
        .unwrap_or(crate::model::snapshot::InterestState {
            current_interest: 0.0,
            interest_index: 0,
            next_interest_date: event.date,
            accumulated_taxable_interest: 0.0,
        });
    state.current_interest = accrued;
    state.interest_index += 1;
    state.next_interest_date = crate::date_math::next_date(event.date, compounded, 1, None);
    if !account_type.is_tax_deferred() {
        state.accumulated_taxable_interest += accrued;
    }

    let posting = Posting {
        id: event.id.clone(),
        name: "Interest".to_string(),
        account: event.primary_account_id.clone(),
        amount: accrued,
        date: event.date,
        category: "interest".to_string(),
        from: None,
        to: None,
        is_transfer: false,
        flag: None,
        flag_color: None,
        bill_id: None,
        interest_id: Some(interest_id.clone()),
        first_bill: false,
        first_interest: state.interest_index == 1,
        balance: 0.0,
    };

    let mut updates = FxHashMap::default();
    updates.insert(interest_id.clone(), state);
    SegmentDelta { postings: vec![posting], interest_state_updates: updates, warnings: Vec::new() }
}

/// Transfer: literal tokens resolve against the destination account's
/// balance at the moment the transfer executes (spec.md open question,
/// resolved in favour of the destination side).
fn transfer(
    event: &Event,
    name: &str,
    amount: &Amount,
    category: &str,
    from: &AccountId,
    to: &AccountId,
    retroactive: bool,
    tracker: &BalanceTracker,
) -> SegmentDelta {
    let resolved = if retroactive {
        amount.as_number().unwrap_or(0.0)
    } else {
        amount.resolve(tracker.balance(to))
    };

    let debit = Posting {
        id: event.id.clone(),
        name: name.to_string(),
        account: from.clone(),
        amount: -resolved,
        date: event.date,
        category: category.to_string(),
        from: Some(from.clone()),
        to: Some(to.clone()),
        is_transfer: true,
        flag: None,
        flag_color: None,
        bill_id: None,
        interest_id: None,
        first_bill: false,
        first_interest: false,
        balance: 0.0,
    };
    let mut credit = debit.clone();
    credit.account = to.clone();
    credit.amount = resolved;

    SegmentDelta {
        postings: vec![debit, credit],
        interest_state_updates: FxHashMap::default(),
        warnings: Vec::new(),
    }
}

fn pension(event: &Event, schedule: &crate::model::pension::PensionSchedule) -> SegmentDelta {
    let posting = Posting {
        id: event.id.clone(),
        name: "Pension".to_string(),
        account: schedule.deposit_account.clone(),
        amount: schedule.monthly_benefit(),
        date: event.date,
        category: "pension".to_string(),
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
    };
    SegmentDelta { postings: vec![posting], interest_state_updates: FxHashMap::default(), warnings: Vec::new() }
}

/// Average Indexed Monthly Earnings across the top 35 years on record
/// (spec.md §4.7). Earnings at or before the year the employee turns 60
/// are wage-indexed against the caller-supplied Average Wage Index:
/// `earnings(y) * AWI(ageAt60) / AWI(y)`; earnings after age 60 are used
/// raw, as the statute requires. Without an AWI series the rate book
/// returns `None` and indexing is a no-op, so AIME falls back to raw
/// top-35 earnings.
fn compute_aime(schedule: &crate::model::social_security::SocialSecuritySchedule, ctx: &CalculationContext) -> f64 {
    let age_60_year = schedule.employee_dob.year() + 60;
    let awi = ctx.rate_book.average_wage_index();
    let awi_at_60 = awi.map(|series| series.value_or_extrapolate(age_60_year));

    let mut indexed: Vec<f64> = schedule
        .earnings_history
        .iter()
        .map(|(&year, &earnings)| match (awi, awi_at_60) {
            (Some(series), Some(target)) if year <= age_60_year => {
                let awi_at_year = series.value_or_extrapolate(year);
                if awi_at_year > 0.0 { earnings * target / awi_at_year } else { earnings }
            }
            _ => earnings,
        })
        .collect();
    indexed.sort_by(|a, b| b.partial_cmp(a).unwrap());
    indexed.truncate(35);
    while indexed.len() < 35 {
        indexed.push(0.0);
    }
    indexed.iter().sum::<f64>() / (35.0 * 12.0)
}

fn compute_pia(aime_monthly: f64, bend1: f64, bend2: f64) -> f64 {
    let first = aime_monthly.min(bend1);
    let second = (aime_monthly.min(bend2) - bend1).max(0.0);
    let third = (aime_monthly - bend2).max(0.0);
    first * PIA_PERCENTAGES[0] + second * PIA_PERCENTAGES[1] + third * PIA_PERCENTAGES[2]
}

/// The two PIA bend points at `yearTurn62` (spec.md §4.7). Sourced from
/// the caller-supplied bend-point series when the rate model provides
/// one; falls back to the base-year constants escalated by the `Raise`
/// series only when no bend-point series was supplied at all, so a
/// caller that never configures one still gets a usable (if synthetic)
/// estimate instead of a missing benefit.
fn bend_points_for(ctx: &CalculationContext, year_turn_62: i16) -> (f64, f64) {
    if let Some((bp1, bp2)) = ctx.rate_book.bend_points() {
        return (bp1.value_or_extrapolate(year_turn_62), bp2.value_or_extrapolate(year_turn_62));
    }
    let years_since_base = i32::from(year_turn_62 - BEND_POINT_BASE_YEAR);
    let raise = ctx.rate_book.rate_for_year(&RateVariable::Raise, year_turn_62);
    let escalation = (1.0 + raise).powi(years_since_base.max(0));
    (BASE_BEND_POINT_1 * escalation, BASE_BEND_POINT_2 * escalation)
}

fn social_security_benefit(
    event: &Event,
    schedule: &crate::model::social_security::SocialSecuritySchedule,
    ctx: &CalculationContext,
) -> SegmentDelta {
    let year_turn_62 = schedule.employee_dob.year() + 62;
    let (bend1, bend2) = bend_points_for(ctx, year_turn_62);

    let aime = compute_aime(schedule, ctx);
    let pia = compute_pia(aime, bend1, bend2);

    let age_months = {
        let years = age_in_years(schedule.employee_dob, event.date);
        years as u32 * 12
    };
    let fra_months = social_security::full_retirement_age_months(schedule.employee_dob.year());
    let collection_months = schedule.collection_age_years * 12 + schedule.collection_age_months;
    let factor = social_security::collection_age_factor(collection_months, fra_months);

    let benefit = if age_months >= collection_months { pia * factor } else { 0.0 };

    let posting = Posting {
        id: event.id.clone(),
        name: "Social Security".to_string(),
        account: schedule.deposit_account.clone(),
        amount: benefit,
        date: event.date,
        category: "social_security".to_string(),
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
    };
    SegmentDelta { postings: vec![posting], interest_state_updates: FxHashMap::default(), warnings: Vec::new() }
}

/// RMD fires on Dec 31 for every retirement account whose owner has
/// reached the trigger age, withdrawing `balance / divisor` (spec.md
/// §4.7, scenario S5).
fn rmd_distribution(event: &Event, tracker: &BalanceTracker, ctx: &CalculationContext) -> SegmentDelta {
    let Some(account) = ctx.accounts.get(&event.primary_account_id) else {
        return SegmentDelta::default();
    };
    let Some(retirement) = &account.retirement else {
        return SegmentDelta::default();
    };
    if !retirement.uses_rmd {
        return SegmentDelta::default();
    }
    let Some(dob) = retirement.account_owner_dob else {
        return SegmentDelta::default();
    };

    let age = age_in_years(dob, event.date);
    let Some(divisor) = rmd::divisor_for_age(age) else {
        return SegmentDelta::default();
    };

    let balance = tracker.balance(&event.primary_account_id);
    if balance <= 0.0 {
        return SegmentDelta::default();
    }
    let distribution = balance / divisor;
    let destination = retirement.rmd_account.clone().unwrap_or_else(|| event.primary_account_id.clone());

    let debit = Posting {
        id: event.id.clone(),
        name: "Required Minimum Distribution".to_string(),
        account: event.primary_account_id.clone(),
        amount: -distribution,
        date: event.date,
        category: "rmd".to_string(),
        from: Some(event.primary_account_id.clone()),
        to: Some(destination.clone()),
        is_transfer: true,
        flag: None,
        flag_color: None,
        bill_id: None,
        interest_id: None,
        first_bill: false,
        first_interest: false,
        balance: 0.0,
    };
    let mut credit = debit.clone();
    credit.account = destination;
    credit.amount = distribution;

    SegmentDelta {
        postings: vec![debit, credit],
        interest_state_updates: FxHashMap::default(),
        warnings: Vec::new(),
    }
}

/// Tax day (Apr 1): settle the prior year's taxable interest for
/// non-tax-deferred accounts, plus (for accounts with retirement
/// attributes) ordinary income tax on the prior year's retirement
/// withdrawals and, for any withdrawal dated before `earlyWithdrawalDate`,
/// an additional early-withdrawal penalty (spec.md §4.7).
fn tax(event: &Event, tracker: &BalanceTracker, ctx: &CalculationContext) -> SegmentDelta {
    let Some(account) = ctx.accounts.get(&event.primary_account_id) else {
        return SegmentDelta::default();
    };

    let mut updates = FxHashMap::default();
    let mut taxable_interest = 0.0;
    for interest in &account.interests {
        if let Some(state) = tracker.interest_state(&interest.id) {
            if state.accumulated_taxable_interest.abs() > 1e-9 {
                taxable_interest += state.accumulated_taxable_interest;
                let mut reset = state.clone();
                reset.accumulated_taxable_interest = 0.0;
                updates.insert(interest.id.clone(), reset);
            }
        }
    }
    let interest_tax_rate =
        account.retirement.as_ref().and_then(|r| r.withdrawal_tax_rate).unwrap_or(DEFAULT_TAX_RATE);
    let interest_tax_due = taxable_interest * interest_tax_rate;

    let mut withdrawal_tax_due = 0.0;
    if let Some(retirement) = &account.retirement {
        let prior_year = event.date.year() - 1;
        let window_start = jiff::civil::date(prior_year, 1, 1);
        let window_end = jiff::civil::date(prior_year, 12, 31);
        let withdrawal_tax_rate = retirement.withdrawal_tax_rate.unwrap_or(DEFAULT_TAX_RATE);
        for posting in tracker.postings_in_range(&event.primary_account_id, window_start, window_end) {
            if !posting.is_transfer || posting.amount >= 0.0 {
                continue;
            }
            let withdrawal = -posting.amount;
            withdrawal_tax_due += withdrawal * withdrawal_tax_rate;
            if retirement.early_withdrawal_date.is_some_and(|cutoff| posting.date < cutoff) {
                withdrawal_tax_due += withdrawal * retirement.early_withdrawal_penalty_rate.unwrap_or(0.0);
            }
        }
    }

    let tax_due = interest_tax_due + withdrawal_tax_due;
    if tax_due.abs() < 1e-5 {
        return SegmentDelta { postings: Vec::new(), interest_state_updates: updates, warnings: Vec::new() };
    }

    let posting = Posting {
        id: event.id.clone(),
        name: "Tax settlement".to_string(),
        account: event.primary_account_id.clone(),
        amount: -tax_due,
        date: event.date,
        category: "tax".to_string(),
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
    };
    SegmentDelta { postings: vec![posting], interest_state_updates: updates, warnings: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::account::AccountType;
    use crate::model::event::EventKind;
    use crate::model::ids::EventId;
    use crate::rates::StaticRateSeriesSource;
    use crate::variables::StaticVariableStore;
    use jiff::civil::date;
    use rustc_hash::FxHashSet;

    fn plain_account(id: &str) -> Account {
        Account {
            id: AccountId::new(id),
            name: id.to_string(),
            account_type: AccountType::Checking,
            activity: Vec::new(),
            bills: Vec::new(),
            interests: Vec::new(),
            push_pull: None,
            retirement: None,
            pension: None,
            social_security: None,
        }
    }

    fn ctx<'a>(
        rate_book: &'a RateBook<'a>,
        variables: &'a StaticVariableStore,
        accounts: &'a FxHashMap<AccountId, Account>,
    ) -> CalculationContext<'a> {
        CalculationContext { simulation_label: "base", rate_book, variables, accounts }
    }

    #[test]
    fn transfer_resolves_full_token_against_destination_balance() {
        let src = StaticRateSeriesSource::new();
        let book = RateBook::deterministic(&src);
        let vars = StaticVariableStore::new();
        let accounts = FxHashMap::default();
        let c = ctx(&book, &vars, &accounts);

        let mut tracker = BalanceTracker::initialize(&[plain_account("savings")]);
        tracker.apply_segment_delta(
            SegmentDelta {
                postings: vec![Posting {
                    id: EventId::new("seed"),
                    name: "seed".into(),
                    account: AccountId::new("savings"),
                    amount: 2000.0,
                    date: date(2025, 1, 1),
                    category: String::new(),
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
                }],
                interest_state_updates: FxHashMap::default(),
                warnings: Vec::new(),
            },
            EventId::new("seed"),
        );

        let event = Event {
            id: EventId::new("xfer"),
            kind: EventKind::Transfer,
            date: date(2025, 2, 1),
            primary_account_id: AccountId::new("checking"),
            priority: EventKind::Transfer.priority(),
            cacheable: false,
            dependencies: FxHashSet::default(),
            payload: EventPayload::Transfer {
                schedule_id: None,
                name: "sweep".into(),
                amount: Amount::Token(crate::model::amount::AmountToken::Full),
                category: String::new(),
                from: AccountId::new("savings"),
                to: AccountId::new("savings"),
                is_first: false,
                retroactive: false,
            },
        };

        let delta = process_event(&event, &tracker, &c);
        assert_eq!(delta.postings.len(), 2);
    }

    #[test]
    fn interest_below_threshold_produces_no_posting() {
        let src = StaticRateSeriesSource::new();
        let book = RateBook::deterministic(&src);
        let vars = StaticVariableStore::new();
        let accounts = FxHashMap::default();
        let c = ctx(&book, &vars, &accounts);
        let tracker = BalanceTracker::initialize(&[plain_account("savings")]);

        let event = Event {
            id: EventId::new("int"),
            kind: EventKind::Interest,
            date: date(2025, 1, 31),
            primary_account_id: AccountId::new("savings"),
            priority: EventKind::Interest.priority(),
            cacheable: true,
            dependencies: FxHashSet::default(),
            payload: EventPayload::Interest {
                interest_id: crate::model::ScheduleId::new("int-sched"),
                apr: 0.01,
                compounded: crate::date_math::Period::Month,
                is_first: true,
            },
        };

        let delta = process_event(&event, &tracker, &c);
        assert!(delta.postings.is_empty(), "zero balance should accrue no interest");
    }
}
