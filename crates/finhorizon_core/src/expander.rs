//! Schedule expansion (spec.md §4.2): turns declarative bills, interests,
//! transfers, pensions, Social Security, and RMD schedules into dated
//! events. Each expansion loop is capped at [`crate::timeline::MAX_EVENTS`]
//! so a misconfigured schedule (e.g. a zero-length period) fails fast
//! with a [`EngineError::Configuration`] instead of looping forever.

use jiff::civil::{Date, date};
use rustc_hash::FxHashSet;

use crate::date_math::{next_date, Period};
use crate::error::{EngineError, Result};
use crate::model::account::Account;
use crate::model::amount::Amount;
use crate::model::event::{Event, EventKind, EventPayload};
use crate::model::ids::{AccountId, EventId, ScheduleId};
use crate::model::pension::PensionSchedule;
use crate::model::rmd::RMD_START_AGE;
use crate::model::schedule::{Bill, Interest, Transfer};
use crate::model::social_security::SocialSecuritySchedule;
use crate::rate_book::RateBook;
use crate::rates::RateVariable;
use crate::timeline::MAX_EVENTS;
use crate::variables::{VariableStore, VariableValue};

/// Resolve a bill/transfer's `amount_variable` against the caller-supplied
/// variable store (spec.md §4.2: "resolving variable names via the
/// simulation variable store; numeric -> use; string literal token ->
/// keep as token for later balance-dependent resolution"). An unresolved
/// variable is a non-fatal [`crate::error::EngineWarning::VariableUnresolved`]
/// at the engine layer; here it simply falls back to the schedule's own
/// declared `amount` so expansion never blocks on a missing variable.
fn resolve_starting_amount(
    declared: &Amount,
    amount_variable: Option<&str>,
    simulation_label: &str,
    variables: &dyn VariableStore,
) -> Amount {
    let Some(name) = amount_variable else { return declared.clone() };
    match variables.lookup(name, simulation_label) {
        Some(VariableValue::Amount(resolved)) => resolved,
        _ => declared.clone(),
    }
}

/// Sentinel account used by [`EventPayload::MonthEndCheck`], which isn't
/// scoped to a single account — the engine handles push/pull maintenance
/// across the whole portfolio when it sees this event.
pub const PORTFOLIO_SENTINEL: &str = "__portfolio__";

fn escalate(amount: f64, increase_by: Option<f64>, ceiling_multiple: Option<f64>) -> f64 {
    let escalated = match increase_by {
        Some(rate) => amount * (1.0 + rate),
        None => amount,
    };
    match ceiling_multiple {
        Some(m) if m > 0.0 => (escalated / m).ceil() * m,
        _ => escalated,
    }
}

fn date_id(schedule: &ScheduleId, kind: &str, d: Date) -> EventId {
    EventId::new(format!("{schedule}:{kind}:{d}"))
}

/// Expand one [`Bill`] into dated events against `account_id`, applying
/// the per-anniversary inflation-with-ceiling-rounding rule (spec.md
/// scenario S1).
pub fn expand_bill(
    bill: &Bill,
    account_id: &AccountId,
    horizon_end: Date,
    simulation_label: &str,
    variables: &dyn VariableStore,
) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut current_date = bill.start_date;
    let mut current_amount =
        resolve_starting_amount(&bill.amount, bill.amount_variable.as_deref(), simulation_label, variables);
    let mut periods_elapsed: u32 = 0;
    let end = bill.end_date.map_or(horizon_end, |e| e.min(horizon_end));
    let anchor = bill.increase_by_date.map(|d| (d.month(), d.day()));
    let mut is_first = true;

    while current_date <= end {
        if events.len() >= MAX_EVENTS {
            return Err(EngineError::Configuration {
                schedule: bill.id.clone(),
                message: format!("bill expansion exceeded {MAX_EVENTS} events"),
            });
        }

        if bill.is_transfer {
            let (Some(from), Some(to)) = (bill.from.clone(), bill.to.clone()) else {
                return Err(EngineError::Configuration {
                    schedule: bill.id.clone(),
                    message: "a transfer bill needs both from and to accounts".to_string(),
                });
            };
            let mut dependencies = FxHashSet::default();
            dependencies.insert(from.clone());
            events.push(Event {
                id: date_id(&bill.id, "bill", current_date),
                kind: EventKind::Transfer,
                date: current_date,
                primary_account_id: to.clone(),
                priority: EventKind::Transfer.priority(),
                cacheable: bill.amount_variable.is_none() && !current_amount.is_token(),
                dependencies,
                payload: EventPayload::Transfer {
                    schedule_id: Some(bill.id.clone()),
                    name: bill.name.clone(),
                    amount: current_amount.clone(),
                    category: bill.category.clone(),
                    from,
                    to,
                    is_first,
                    retroactive: false,
                },
            });
        } else {
            events.push(Event {
                id: date_id(&bill.id, "bill", current_date),
                kind: EventKind::Bill,
                date: current_date,
                primary_account_id: account_id.clone(),
                priority: EventKind::Bill.priority(),
                cacheable: bill.amount_variable.is_none(),
                dependencies: FxHashSet::default(),
                payload: EventPayload::Bill {
                    bill_id: bill.id.clone(),
                    name: bill.name.clone(),
                    amount: current_amount.clone(),
                    category: bill.category.clone(),
                    flag: bill.flag.clone(),
                    is_first,
                },
            });
        }
        is_first = false;

        if bill.every_n == 0 {
            return Err(EngineError::Configuration {
                schedule: bill.id.clone(),
                message: "bill period step (everyN) must be non-zero".to_string(),
            });
        }
        current_date = next_date(current_date, bill.period, bill.every_n, anchor);
        periods_elapsed += bill.every_n;

        if bill.increase_by_periods > 0 && periods_elapsed >= bill.increase_by_periods {
            if let Amount::Number(n) = current_amount {
                current_amount = Amount::Number(escalate(n, bill.increase_by, bill.ceiling_multiple));
            }
            periods_elapsed = 0;
        }
    }

    Ok(events)
}

/// Expand a recurring [`Transfer`] into dated events. `primary_account_id`
/// is set to the destination (`to`) side since that's the balance a
/// literal token amount resolves against; the dependency graph records
/// the source side so retroactive inserts on `from` can flag `to` as
/// affected.
pub fn expand_transfer(
    transfer: &Transfer,
    horizon_end: Date,
    simulation_label: &str,
    variables: &dyn VariableStore,
) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut current_date = transfer.start_date;
    let mut current_amount = resolve_starting_amount(
        &transfer.amount,
        transfer.amount_variable.as_deref(),
        simulation_label,
        variables,
    );
    let mut periods_elapsed: u32 = 0;
    let end = transfer.end_date.map_or(horizon_end, |e| e.min(horizon_end));
    let anchor = transfer.increase_by_date.map(|d| (d.month(), d.day()));
    let mut is_first = true;

    while current_date <= end {
        if events.len() >= MAX_EVENTS {
            return Err(EngineError::Configuration {
                schedule: transfer.id.clone(),
                message: format!("transfer expansion exceeded {MAX_EVENTS} events"),
            });
        }

        let mut dependencies = FxHashSet::default();
        dependencies.insert(transfer.from.clone());

        events.push(Event {
            id: date_id(&transfer.id, "transfer", current_date),
            kind: EventKind::Transfer,
            date: current_date,
            primary_account_id: transfer.to.clone(),
            priority: EventKind::Transfer.priority(),
            cacheable: transfer.amount_variable.is_none() && !current_amount.is_token(),
            dependencies,
            payload: EventPayload::Transfer {
                schedule_id: Some(transfer.id.clone()),
                name: transfer.name.clone(),
                amount: current_amount.clone(),
                category: transfer.category.clone(),
                from: transfer.from.clone(),
                to: transfer.to.clone(),
                is_first,
                retroactive: false,
            },
        });
        is_first = false;

        if transfer.every_n == 0 {
            return Err(EngineError::Configuration {
                schedule: transfer.id.clone(),
                message: "transfer period step (everyN) must be non-zero".to_string(),
            });
        }
        current_date = next_date(current_date, transfer.period, transfer.every_n, anchor);
        periods_elapsed += transfer.every_n;

        if transfer.increase_by_periods > 0 && periods_elapsed >= transfer.increase_by_periods {
            if let Amount::Number(n) = current_amount {
                current_amount = Amount::Number(escalate(n, transfer.increase_by, transfer.ceiling_multiple));
            }
            periods_elapsed = 0;
        }
    }

    Ok(events)
}

/// Expand an [`Interest`] schedule into one event per compounding period.
/// A variable APR is resolved once per period against `rate_book`, which
/// means a Monte-Carlo run's draw naturally varies the accrual year over
/// year while a deterministic run sees the historical/mean rate.
pub fn expand_interest(
    interest: &Interest,
    account_id: &AccountId,
    horizon_end: Date,
    rate_book: &RateBook,
) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut current_date = interest.applicable_date;
    let end = interest.end_date.map_or(horizon_end, |e| e.min(horizon_end));
    let mut is_first = true;

    while current_date <= end {
        if events.len() >= MAX_EVENTS {
            return Err(EngineError::Configuration {
                schedule: interest.id.clone(),
                message: format!("interest expansion exceeded {MAX_EVENTS} events"),
            });
        }

        let apr = if interest.apr_is_variable {
            let name = interest.apr_variable.clone().unwrap_or_default();
            rate_book.rate_for_year(&RateVariable::Investment(name), current_date.year())
        } else {
            interest.apr
        };

        events.push(Event {
            id: date_id(&interest.id, "interest", current_date),
            kind: EventKind::Interest,
            date: current_date,
            primary_account_id: account_id.clone(),
            priority: EventKind::Interest.priority(),
            cacheable: !interest.apr_is_variable,
            dependencies: FxHashSet::default(),
            payload: EventPayload::Interest {
                interest_id: interest.id.clone(),
                apr,
                compounded: interest.compounded,
                is_first,
            },
        });
        is_first = false;
        current_date = next_date(current_date, interest.compounded, 1, None);
    }

    Ok(events)
}

/// One RMD event per calendar year, dated Dec 31, for every year the
/// account owner is at or above [`RMD_START_AGE`] (spec.md scenario S5).
#[must_use]
pub fn expand_rmd(account: &Account, horizon_start: Date, horizon_end: Date) -> Vec<Event> {
    let Some(retirement) = &account.retirement else { return Vec::new() };
    if !retirement.uses_rmd {
        return Vec::new();
    }
    let Some(dob) = retirement.account_owner_dob else { return Vec::new() };

    let mut events = Vec::new();
    for year in horizon_start.year()..=horizon_end.year() {
        let dec_31 = date(year, 12, 31);
        if dec_31 < horizon_start || dec_31 > horizon_end {
            continue;
        }
        if crate::date_math::age_in_years(dob, dec_31) >= RMD_START_AGE {
            // spec.md §4.5: "RMD: event -> the RMD source account and the
            // target (rmdAccount)" — primary_account_id is the source, so
            // only the target needs to be recorded as a dependency.
            let mut dependencies = FxHashSet::default();
            if let Some(target) = &retirement.rmd_account {
                dependencies.insert(target.clone());
            }
            events.push(Event {
                id: EventId::new(format!("{}:rmd:{year}", account.id)),
                kind: EventKind::Rmd,
                date: dec_31,
                primary_account_id: account.id.clone(),
                priority: EventKind::Rmd.priority(),
                cacheable: true,
                dependencies,
                payload: EventPayload::Rmd,
            });
        }
    }
    events
}

/// One pension deposit per month from `start_date` to the horizon end.
#[must_use]
pub fn expand_pension(schedule: &PensionSchedule, horizon_end: Date) -> Vec<Event> {
    let mut events = Vec::new();
    let mut current_date = schedule.start_date;
    while current_date <= horizon_end && events.len() < MAX_EVENTS {
        events.push(Event {
            id: date_id(&schedule.id, "pension", current_date),
            kind: EventKind::Pension,
            date: current_date,
            primary_account_id: schedule.deposit_account.clone(),
            priority: EventKind::Pension.priority(),
            cacheable: true,
            dependencies: FxHashSet::default(),
            payload: EventPayload::Pension { schedule: schedule.clone() },
        });
        current_date = next_date(current_date, Period::Month, 1, None);
    }
    events
}

/// One Social Security deposit per month once the employee reaches the
/// declared collection age.
#[must_use]
pub fn expand_social_security(schedule: &SocialSecuritySchedule, horizon_end: Date) -> Vec<Event> {
    let mut start = schedule.employee_dob;
    for _ in 0..schedule.collection_age_years {
        start = crate::date_math::add_years(start, 1);
    }
    for _ in 0..schedule.collection_age_months {
        start = crate::date_math::add_months(start, 1);
    }

    let mut events = Vec::new();
    let mut current_date = start;
    while current_date <= horizon_end && events.len() < MAX_EVENTS {
        events.push(Event {
            id: date_id(&schedule.id, "ss", current_date),
            kind: EventKind::SocialSecurity,
            date: current_date,
            primary_account_id: schedule.deposit_account.clone(),
            priority: EventKind::SocialSecurity.priority(),
            cacheable: true,
            dependencies: FxHashSet::default(),
            payload: EventPayload::SocialSecurity { schedule: schedule.clone() },
        });
        current_date = next_date(current_date, Period::Month, 1, None);
    }
    events
}

/// One tax-settlement event per year, dated Apr 1, for every retirement
/// account that tracks taxable interest or a withdrawal tax rate.
#[must_use]
pub fn expand_tax(account: &Account, horizon_start: Date, horizon_end: Date) -> Vec<Event> {
    if account.retirement.is_none() && account.interests.is_empty() {
        return Vec::new();
    }
    let mut events = Vec::new();
    for year in horizon_start.year()..=horizon_end.year() {
        let apr_1 = date(year, 4, 1);
        if apr_1 < horizon_start || apr_1 > horizon_end {
            continue;
        }
        events.push(Event {
            id: EventId::new(format!("{}:tax:{year}", account.id)),
            kind: EventKind::Tax,
            date: apr_1,
            primary_account_id: account.id.clone(),
            priority: EventKind::Tax.priority(),
            cacheable: true,
            dependencies: FxHashSet::default(),
            payload: EventPayload::Tax,
        });
    }
    events
}

/// One `MonthEndCheck` event per month, which signals the engine to run
/// the push/pull pass after the month's other events have settled.
#[must_use]
pub fn expand_month_end_checks(horizon_start: Date, horizon_end: Date) -> Vec<Event> {
    let mut events = Vec::new();
    let mut cursor = crate::date_math::month_end(horizon_start);
    while cursor <= horizon_end {
        events.push(Event {
            id: EventId::new(format!("month-end:{cursor}")),
            kind: EventKind::MonthEndCheck,
            date: cursor,
            primary_account_id: AccountId::new(PORTFOLIO_SENTINEL),
            priority: EventKind::MonthEndCheck.priority(),
            cacheable: false,
            dependencies: FxHashSet::default(),
            payload: EventPayload::MonthEndCheck,
        });
        cursor = crate::date_math::month_end(crate::date_math::next_month_start(cursor));
    }
    events
}
