//! Cross-cutting properties every calculation must hold (spec.md §8,
//! properties 1-5 and 9; idempotence/determinism live in
//! `orchestration` alongside the cache/Monte-Carlo machinery that makes
//! them interesting).

use jiff::civil::date;

use crate::date_math::Period;
use crate::engine;
use crate::model::account::{AccountType, PushPullPolicy};
use crate::model::amount::Amount;
use crate::model::ids::{AccountId, ScheduleId};
use crate::model::schedule::{Bill, Transfer};
use crate::tests::support::*;

/// Property 1: every Transfer event posts two legs that sum to zero and
/// carry equal-and-opposite amounts.
#[test]
fn conservation_holds_for_every_transfer() {
    let mut checking = bare_account("checking", AccountType::Checking);
    checking.activity.push(opening_balance("checking", 500.0, date(2025, 1, 1)));
    let mut savings = bare_account("savings", AccountType::Savings);
    savings.activity.push(opening_balance("savings", 0.0, date(2025, 1, 1)));

    let mut doc = document(vec![checking, savings]);
    doc.transfers.bills.push(Transfer {
        id: ScheduleId::new("sweep"),
        name: "Sweep".to_string(),
        amount: Amount::Number(200.0),
        amount_variable: None,
        start_date: date(2025, 1, 10),
        end_date: Some(date(2025, 1, 10)),
        period: Period::Month,
        every_n: 1,
        increase_by: None,
        increase_by_periods: 1,
        increase_by_date: None,
        increase_by_variable: None,
        ceiling_multiple: None,
        category: "transfer".to_string(),
        flag: None,
        from: AccountId::new("checking"),
        to: AccountId::new("savings"),
    });

    let opts = options(date(2025, 1, 31));
    let mut cache = fresh_cache("invariant_conservation");
    let result = engine::run(&doc, &opts, &no_rates(), &no_variables(), &mut cache).unwrap();

    let transfer_postings: Vec<_> = result
        .accounts
        .iter()
        .flat_map(|a| a.postings.iter())
        .filter(|p| p.is_transfer)
        .collect();
    assert_eq!(transfer_postings.len(), 2, "a transfer posts exactly two legs");
    let total: f64 = transfer_postings.iter().map(|p| p.amount).sum();
    assert!(total.abs() < 1e-9, "transfer legs must sum to zero, got {total}");
    assert_eq!(transfer_postings[0].amount, -transfer_postings[1].amount);
}

/// Property 2: each posting's recorded `balance` equals the previous
/// posting's balance plus this posting's amount, seeded by the opening
/// balance.
#[test]
fn running_balance_matches_posting_amounts() {
    let mut checking = bare_account("checking", AccountType::Checking);
    checking.activity.push(opening_balance("checking", 1000.0, date(2025, 1, 1)));
    checking.bills.push(Bill {
        id: ScheduleId::new("rent"),
        name: "Rent".to_string(),
        amount: Amount::Number(-500.0),
        amount_variable: None,
        start_date: date(2025, 1, 5),
        end_date: None,
        period: Period::Month,
        every_n: 1,
        increase_by: None,
        increase_by_periods: 1,
        increase_by_date: None,
        increase_by_variable: None,
        ceiling_multiple: None,
        category: "housing".to_string(),
        flag: None,
        is_transfer: false,
        from: None,
        to: None,
    });

    let doc = document(vec![checking]);
    let opts = options(date(2025, 3, 31));
    let mut cache = fresh_cache("invariant_running_balance");
    let result = engine::run(&doc, &opts, &no_rates(), &no_variables(), &mut cache).unwrap();

    let account = result.accounts.iter().find(|a| a.id == AccountId::new("checking")).unwrap();
    let mut postings = account.postings.clone();
    postings.sort_by_key(|p| (p.date, p.id.as_str().to_string()));

    let mut running = 0.0;
    for posting in &postings {
        running += posting.amount;
        assert!(
            (posting.balance - running).abs() < 1e-9,
            "posting {:?} recorded balance {} but running total is {running}",
            posting.id,
            posting.balance
        );
    }
}

/// Property 3/4: same-day events apply in priority order, and an
/// Opening Balance posting (priority 1, same as any other Activity) is
/// never pushed behind a same-day Bill (priority 2).
#[test]
fn opening_balance_precedes_same_day_bill() {
    let mut checking = bare_account("checking", AccountType::Checking);
    checking.activity.push(opening_balance("checking", 1000.0, date(2025, 1, 1)));
    checking.bills.push(Bill {
        id: ScheduleId::new("day_one_fee"),
        name: "Day One Fee".to_string(),
        amount: Amount::Number(-10.0),
        amount_variable: None,
        start_date: date(2025, 1, 1),
        end_date: Some(date(2025, 1, 1)),
        period: Period::Month,
        every_n: 1,
        increase_by: None,
        increase_by_periods: 1,
        increase_by_date: None,
        increase_by_variable: None,
        ceiling_multiple: None,
        category: "fee".to_string(),
        flag: None,
        is_transfer: false,
        from: None,
        to: None,
    });

    let doc = document(vec![checking]);
    let opts = options(date(2025, 1, 31));
    let mut cache = fresh_cache("invariant_opening_balance_order");
    let result = engine::run(&doc, &opts, &no_rates(), &no_variables(), &mut cache).unwrap();

    let account = result.accounts.iter().find(|a| a.id == AccountId::new("checking")).unwrap();
    let day_one: Vec<_> = account.postings.iter().filter(|p| p.date == date(2025, 1, 1)).collect();
    assert_eq!(day_one.len(), 2);
    assert_eq!(day_one[0].category, "opening_balance", "opening balance must post first on its date");
    assert_eq!(day_one[0].balance, 1000.0);
    assert_eq!(day_one[1].balance, 990.0);
}

/// Property 5: exactly one posting per `billId` carries `firstBill =
/// true`, on the schedule's very first occurrence.
#[test]
fn first_bill_flag_is_unique_per_schedule() {
    let mut checking = bare_account("checking", AccountType::Checking);
    checking.activity.push(opening_balance("checking", 5000.0, date(2025, 1, 1)));
    checking.bills.push(Bill {
        id: ScheduleId::new("subscription"),
        name: "Subscription".to_string(),
        amount: Amount::Number(-15.0),
        amount_variable: None,
        start_date: date(2025, 1, 1),
        end_date: None,
        period: Period::Month,
        every_n: 1,
        increase_by: None,
        increase_by_periods: 1,
        increase_by_date: None,
        increase_by_variable: None,
        ceiling_multiple: None,
        category: "subscription".to_string(),
        flag: None,
        is_transfer: false,
        from: None,
        to: None,
    });

    let doc = document(vec![checking]);
    let opts = options(date(2025, 6, 30));
    let mut cache = fresh_cache("invariant_first_bill");
    let result = engine::run(&doc, &opts, &no_rates(), &no_variables(), &mut cache).unwrap();

    let account = result.accounts.iter().find(|a| a.id == AccountId::new("checking")).unwrap();
    let subscription_postings: Vec<_> =
        account.postings.iter().filter(|p| p.bill_id == Some(ScheduleId::new("subscription"))).collect();
    assert_eq!(subscription_postings.len(), 6, "one posting per month from January through June");
    assert!(
        subscription_postings.iter().all(|p| p.bill_id.is_some()),
        "every posting from this bill must carry its schedule id"
    );
    let first_flagged: Vec<_> = subscription_postings.iter().filter(|p| p.first_bill).collect();
    assert_eq!(first_flagged.len(), 1, "exactly one posting should carry firstBill=true");
    assert_eq!(first_flagged[0].date, date(2025, 1, 1));
}

/// Property 9: once a retroactive pull lands on month M's first day
/// because the coming month's projected minimum would dip below
/// `minimumBalance`, the realised daily minimum throughout month M is at
/// or above `minimumBalance`.
#[test]
fn push_pull_insert_never_regresses_the_minimum() {
    let mut checking = bare_account("checking", AccountType::Checking);
    checking.activity.push(opening_balance("checking", 1500.0, date(2025, 5, 1)));
    checking.bills.push(Bill {
        id: ScheduleId::new("insurance"),
        name: "Insurance".to_string(),
        amount: Amount::Number(-1800.0),
        amount_variable: None,
        start_date: date(2025, 6, 5),
        end_date: Some(date(2025, 6, 5)),
        period: Period::Month,
        every_n: 1,
        increase_by: None,
        increase_by_periods: 1,
        increase_by_date: None,
        increase_by_variable: None,
        ceiling_multiple: None,
        category: "insurance".to_string(),
        flag: None,
        is_transfer: false,
        from: None,
        to: None,
    });
    checking.push_pull = Some(PushPullPolicy {
        minimum_balance: Some(1000.0),
        minimum_pull_amount: Some(50.0),
        performs_pulls: true,
        performs_pushes: false,
        push_account: None,
        pull_priority: -1,
        push_start: None,
        push_end: None,
    });

    let mut savings = bare_account("savings", AccountType::Savings);
    savings.activity.push(opening_balance("savings", 20_000.0, date(2025, 5, 1)));
    savings.push_pull = Some(PushPullPolicy {
        minimum_balance: Some(0.0),
        minimum_pull_amount: None,
        performs_pulls: false,
        performs_pushes: false,
        push_account: None,
        pull_priority: 0,
        push_start: None,
        push_end: None,
    });

    let doc = document(vec![checking, savings]);
    let opts = options(date(2025, 6, 30));
    let mut cache = fresh_cache("invariant_push_pull_non_regression");
    let result = engine::run(&doc, &opts, &no_rates(), &no_variables(), &mut cache).unwrap();

    let account = result.accounts.iter().find(|a| a.id == AccountId::new("checking")).unwrap();
    let mut postings = account.postings.clone();
    postings.sort_by_key(|p| (p.date, p.balance.to_bits()));
    let minimum_seen = postings.iter().map(|p| p.balance).fold(f64::INFINITY, f64::min);
    assert!(minimum_seen >= 1000.0, "realised minimum was {minimum_seen}, wanted >= 1000");
    assert!(
        postings.iter().any(|p| p.category == "push_pull"),
        "a retroactive pull should have been inserted to cover June's bill"
    );
}
