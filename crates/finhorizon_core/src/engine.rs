//! Orchestration (spec.md §4.9): walk the timeline's monthly segments,
//! apply each event through `calculator`, cache the committed result, and
//! run the push/pull pass at every month boundary — replaying a segment
//! at most once if a retroactive transfer had to be inserted.

use rustc_hash::{FxHashMap, FxHashSet};
#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CachedSegment, SegmentCache, DEFAULT_BYTE_BUDGET, DEFAULT_CACHE_DIR};
use crate::calculator::{self, CalculationContext};
use crate::config::{
    AccountResult, AccountsAndTransfers, CalculationMetadata, CalculationOptions, CalculationResult,
};
use crate::dependency_graph::DependencyGraph;
use crate::error::Result;
use crate::expander;
use crate::metrics::MetricsRecorder;
use crate::model::account::Account;
use crate::model::amount::Amount;
use crate::model::event::{Event, EventKind, EventPayload};
use crate::model::ids::{AccountId, EventId};
use crate::pushpull::{self, MonthlyProjection};
use crate::rate_book::RateBook;
use crate::rates::RateSeriesSource;
use crate::timeline::Timeline;
use crate::tracker::BalanceTracker;
use crate::variables::VariableStore;
use jiff::civil::Date;

fn earliest_date(document: &AccountsAndTransfers) -> Date {
    let mut earliest: Option<Date> = None;
    let mut consider = |d: Date| {
        earliest = Some(earliest.map_or(d, |e| e.min(d)));
    };
    for account in &document.accounts {
        for bill in &account.bills {
            consider(bill.start_date);
        }
        for interest in &account.interests {
            consider(interest.applicable_date);
        }
        for activity in &account.activity {
            consider(activity.date);
        }
    }
    for activity in &document.transfers.activity {
        consider(activity.date);
    }
    for transfer in &document.transfers.bills {
        consider(transfer.start_date);
    }
    earliest.unwrap_or_else(|| jiff::civil::date(1970, 1, 1))
}

fn expand_all(
    document: &AccountsAndTransfers,
    horizon_start: Date,
    horizon_end: Date,
    rate_book: &RateBook,
    simulation_label: &str,
    variables: &dyn VariableStore,
) -> Result<Vec<Event>> {
    let mut events = Vec::new();

    for account in &document.accounts {
        for bill in &account.bills {
            events.extend(expander::expand_bill(bill, &account.id, horizon_end, simulation_label, variables)?);
        }
        for interest in &account.interests {
            events.extend(expander::expand_interest(interest, &account.id, horizon_end, rate_book)?);
        }
        events.extend(expander::expand_rmd(account, horizon_start, horizon_end));
        events.extend(expander::expand_tax(account, horizon_start, horizon_end));
        if let Some(pension) = &account.pension {
            events.extend(expander::expand_pension(pension, horizon_end));
        }
        if let Some(ss) = &account.social_security {
            events.extend(expander::expand_social_security(ss, horizon_end));
        }
        for activity in &account.activity {
            events.push(activity_event(activity, &account.id));
        }
    }

    for transfer in &document.transfers.bills {
        events.extend(expander::expand_transfer(transfer, horizon_end, simulation_label, variables)?);
    }
    for activity in &document.transfers.activity {
        events.push(activity_event(activity, &activity.account.clone()));
    }

    events.extend(expander::expand_month_end_checks(horizon_start, horizon_end));
    Ok(events)
}

fn activity_event(posting: &crate::model::posting::Posting, account_id: &AccountId) -> Event {
    Event {
        id: posting.id.clone(),
        kind: EventKind::Activity,
        date: posting.date,
        primary_account_id: account_id.clone(),
        priority: EventKind::Activity.priority(),
        cacheable: true,
        dependencies: FxHashSet::default(),
        payload: EventPayload::Activity {
            name: posting.name.clone(),
            amount: posting.amount,
            category: posting.category.clone(),
            flag: posting.flag.clone(),
        },
    }
}

fn build_dependency_graph(accounts: &[Account], events: &[Event]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for account in accounts {
        graph.add_account(account.id.clone());
        if let Some(policy) = &account.push_pull {
            if let Some(push_account) = &policy.push_account {
                graph.add_dependency(account.id.clone(), push_account.clone());
            }
        }
    }
    for event in events {
        for dep in &event.dependencies {
            graph.add_dependency(event.primary_account_id.clone(), dep.clone());
        }
    }
    graph
}

fn build_retroactive_transfer(decision: &pushpull::PushPullDecision, month_start: Date, seq: usize) -> Event {
    let (from, to, amount) = if decision.amount >= 0.0 {
        (decision.counterparty.clone(), decision.account.clone(), decision.amount)
    } else {
        (decision.account.clone(), decision.counterparty.clone(), -decision.amount)
    };
    let id = EventId::new(format!("retro:{}:{}:{seq}", decision.account, month_start));
    Event {
        id,
        kind: EventKind::Transfer,
        date: month_start,
        primary_account_id: to.clone(),
        priority: 1,
        cacheable: false,
        dependencies: [from.clone()].into_iter().collect(),
        payload: EventPayload::Transfer {
            schedule_id: None,
            name: "Push/pull maintenance transfer".to_string(),
            amount: Amount::Number(amount),
            category: "push_pull".to_string(),
            from,
            to,
            is_first: false,
            retroactive: true,
        },
    }
}

#[instrument(skip_all, fields(simulation = options.simulation_number, monte_carlo = options.monte_carlo))]
pub fn run(
    document: &AccountsAndTransfers,
    options: &CalculationOptions,
    rate_source: &dyn RateSeriesSource,
    variables: &dyn VariableStore,
    cache: &mut SegmentCache,
) -> Result<CalculationResult> {
    let simulation_label = format!("sim-{}", options.simulation_number);
    let rate_book = if options.monte_carlo {
        RateBook::monte_carlo(rate_source, u64::from(options.simulation_number))
    } else {
        RateBook::deterministic(rate_source)
    };

    let accounts_by_id: FxHashMap<AccountId, Account> =
        document.accounts.iter().map(|a| (a.id.clone(), a.clone())).collect();

    let horizon_start = options.start_date.unwrap_or_else(|| earliest_date(document));
    let horizon_end = options.end_date;

    let mut metrics = MetricsRecorder::new();
    let events = expand_all(document, horizon_start, horizon_end, &rate_book, &simulation_label, variables)?;

    let mut timeline = Timeline::new(events)?;
    let mut dependency_graph = build_dependency_graph(&document.accounts, timeline.events());
    dependency_graph.topological_order()?;
    dependency_graph.reduce_transitive();

    let mut tracker = BalanceTracker::initialize(&document.accounts);
    let mut replayed_months: FxHashSet<Date> = FxHashSet::default();
    let mut retro_sequence = 0usize;

    let mut segment_idx = 0;
    while segment_idx < timeline.segments().len() {
        let (start, end, key, event_ids) = {
            let segment = &timeline.segments()[segment_idx];
            (
                segment.start,
                segment.end,
                segment.content_key.clone(),
                segment.event_indices.iter().map(|&i| timeline.events()[i].id.clone()).collect::<Vec<_>>(),
            )
        };

        let pre_segment_snapshot = tracker.snapshot(start, "pre-segment".to_string());

        let cached = if options.force_recalculation { None } else { cache.get(&key) };
        let contains_month_end = event_ids.iter().any(|id| {
            timeline
                .event_by_id(id)
                .is_some_and(|e| matches!(e.payload, EventPayload::MonthEndCheck))
        });

        if let Some(cached_segment) = cached {
            tracker.apply_cached_segment(&cached_segment);
            metrics.record_cache_hit();
        } else {
            metrics.record_cache_miss();
            for id in &event_ids {
                let Some(event) = timeline.event_by_id(id).cloned() else { continue };
                let ctx = CalculationContext {
                    simulation_label: &simulation_label,
                    rate_book: &rate_book,
                    variables,
                    accounts: &accounts_by_id,
                };
                let delta = calculator::process_event(&event, &tracker, &ctx);
                tracker.apply_segment_delta(delta, event.id.clone());
            }
            metrics.record_events(event_ids.len());

            if !options.monte_carlo {
                let snapshot = tracker.snapshot(end, key.clone());
                let postings = tracker.finalize(Some(start), Some(end));
                cache.put(&key, CachedSegment { snapshot, postings });
            }
        }
        metrics.record_segment();

        if contains_month_end && !replayed_months.contains(&start) {
            // Project the *coming* month from the already-expanded event
            // stream (spec.md §4.8 step 1) rather than reacting to this
            // month's own just-committed trajectory: fork a scratch
            // tracker from the post-month-M state, replay month M+1's
            // events against it without touching the real tracker, then
            // throw the fork away. Any shortfall it reveals is still
            // fixed retroactively on month M's first day (`start`), per
            // scenario S6, so the fix lands before M+1 begins for real.
            // When month M is the last segment in the horizon there's no
            // coming month to project, so the check instead falls back to
            // the month that just closed — the only trajectory left to
            // examine before the calculation ends.
            let (window_start, window_end, postings_next_month, balance_before_window) =
                if segment_idx + 1 < timeline.segments().len() {
                    let next_segment = &timeline.segments()[segment_idx + 1];
                    let (next_start, next_end, next_event_ids) = (
                        next_segment.start,
                        next_segment.end,
                        next_segment
                            .event_indices
                            .iter()
                            .map(|&i| timeline.events()[i].id.clone())
                            .collect::<Vec<_>>(),
                    );

                    let mut projection_tracker = tracker.fork();
                    for id in &next_event_ids {
                        let Some(event) = timeline.event_by_id(id).cloned() else { continue };
                        if matches!(event.payload, EventPayload::MonthEndCheck) {
                            continue;
                        }
                        let ctx = CalculationContext {
                            simulation_label: &simulation_label,
                            rate_book: &rate_book,
                            variables,
                            accounts: &accounts_by_id,
                        };
                        let delta = calculator::process_event(&event, &projection_tracker, &ctx);
                        projection_tracker.apply_segment_delta(delta, event.id.clone());
                    }
                    (
                        next_start,
                        next_end,
                        projection_tracker.finalize(Some(next_start), Some(next_end)),
                        document
                            .accounts
                            .iter()
                            .map(|a| (a.id.clone(), tracker.balance(&a.id)))
                            .collect::<FxHashMap<AccountId, f64>>(),
                    )
                } else {
                    (start, end, tracker.finalize(Some(start), Some(end)), pre_segment_snapshot.balances.clone())
                };
            let empty = Vec::new();
            let mut retro_events = Vec::new();

            // Every account with a configured `pullPriority` is a
            // candidate source for *someone else's* shortfall, not just
            // its own push/pull counterparty (spec.md §4.8 step 3).
            let pull_candidates: Vec<pushpull::PullCandidate> = document
                .accounts
                .iter()
                .filter_map(|a| {
                    let policy = a.push_pull.as_ref()?;
                    Some(pushpull::PullCandidate {
                        account: a.id.clone(),
                        pull_priority: policy.pull_priority,
                        balance: tracker.balance(&a.id),
                        minimum_balance: policy.minimum_balance.unwrap_or(0.0),
                    })
                })
                .collect();

            for account in &document.accounts {
                let Some(policy) = &account.push_pull else { continue };
                if policy.push_start.is_some_and(|s| window_start < s)
                    || policy.push_end.is_some_and(|e| window_start > e)
                {
                    continue;
                }
                let account_postings = postings_next_month.get(&account.id).unwrap_or(&empty);
                let starting_balance = balance_before_window.get(&account.id).copied().unwrap_or(0.0);
                let projection = MonthlyProjection::from_postings(
                    account.id.clone(),
                    account_postings,
                    starting_balance,
                    window_start,
                    window_end,
                    policy.minimum_balance.unwrap_or(0.0),
                );
                let Some(action) = pushpull::decide_action(policy, &projection) else { continue };
                let decision = match action {
                    pushpull::PushPullAction::Pull { amount, risk } => {
                        let Some(source) = pushpull::select_pull_source(&pull_candidates, amount) else {
                            warn!(account = %account.id, "no pullable account has headroom for the shortfall");
                            continue;
                        };
                        pushpull::PushPullDecision { account: account.id.clone(), counterparty: source, amount, risk }
                    }
                    pushpull::PushPullAction::Push { amount } => {
                        let Some(target) = policy.push_account.clone() else { continue };
                        pushpull::PushPullDecision {
                            account: account.id.clone(),
                            counterparty: target,
                            amount: -amount,
                            risk: pushpull::RiskLevel::Low,
                        }
                    }
                };
                debug!(account = %account.id, risk = ?decision.risk, "scheduling retroactive push/pull transfer");
                retro_events.push(build_retroactive_transfer(&decision, start, retro_sequence));
                retro_sequence += 1;
                metrics.record_retroactive_insert();
            }

            if !retro_events.is_empty() {
                tracker.restore_snapshot(&pre_segment_snapshot);
                timeline.add_retroactive_events(retro_events)?;
                replayed_months.insert(start);
                continue;
            }
        }

        segment_idx += 1;
    }

    let postings = tracker.finalize(options.start_date, Some(horizon_end));
    let final_balances: FxHashMap<AccountId, f64> =
        document.accounts.iter().map(|a| (a.id.clone(), tracker.balance(&a.id))).collect();

    let accounts = document
        .accounts
        .iter()
        .map(|a| AccountResult {
            id: a.id.clone(),
            name: a.name.clone(),
            account_type: a.account_type,
            postings: postings.get(&a.id).cloned().unwrap_or_default(),
            balance: tracker.balance(&a.id),
        })
        .collect();

    for warning in tracker.warnings() {
        warn!(%warning, "non-fatal calculation warning");
    }

    let metrics = metrics.finish();
    info!(events = metrics.events_processed, hit_rate = metrics.cache_hit_rate(), "calculation complete");

    Ok(CalculationResult {
        success: true,
        error: None,
        accounts,
        final_balances,
        metrics,
        metadata: CalculationMetadata {
            simulation_number: options.simulation_number,
            total_simulations: options.total_simulations,
            start_date: horizon_start,
            end_date: horizon_end,
        },
    })
}

/// How many independent runs to draw for [`monte_carlo`] and which
/// percentiles of the final-balance distribution to keep full ledgers
/// for (spec.md §1: "Monte-Carlo batches draw macroeconomic rates...
/// run N independent calculations").
#[derive(Debug, Clone)]
pub struct MonteCarloConfig {
    pub iterations: u32,
    pub percentiles: Vec<f64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig { iterations: 500, percentiles: vec![0.1, 0.5, 0.9] }
    }
}

/// Per-account mean and standard deviation of the final balance across a
/// Monte-Carlo batch.
#[derive(Debug, Clone)]
pub struct MonteCarloStats {
    pub iterations: u32,
    pub mean_final_balances: FxHashMap<AccountId, f64>,
    pub std_dev_final_balances: FxHashMap<AccountId, f64>,
}

#[derive(Debug, Clone)]
pub struct MonteCarloResult {
    pub stats: MonteCarloStats,
    /// One full run per requested percentile, keyed by that percentile
    /// (e.g. `0.1` for the 10th percentile outcome).
    pub percentile_runs: Vec<(f64, CalculationResult)>,
}

/// Running per-account sum/sum-of-squares, merged across iterations (or
/// across parallel workers) without keeping every iteration's ledger in
/// memory at once.
struct MeanAccumulator {
    sum: FxHashMap<AccountId, f64>,
    sum_sq: FxHashMap<AccountId, f64>,
    count: u32,
}

impl MeanAccumulator {
    fn new() -> Self {
        MeanAccumulator { sum: FxHashMap::default(), sum_sq: FxHashMap::default(), count: 0 }
    }

    fn accumulate(&mut self, balances: &FxHashMap<AccountId, f64>) {
        for (id, &value) in balances {
            *self.sum.entry(id.clone()).or_insert(0.0) += value;
            *self.sum_sq.entry(id.clone()).or_insert(0.0) += value * value;
        }
        self.count += 1;
    }

    fn finish(self) -> (FxHashMap<AccountId, f64>, FxHashMap<AccountId, f64>) {
        let n = f64::from(self.count.max(1));
        let mean: FxHashMap<AccountId, f64> = self.sum.iter().map(|(id, total)| (id.clone(), total / n)).collect();
        let std_dev = self
            .sum_sq
            .iter()
            .map(|(id, sum_sq)| {
                let m = mean.get(id).copied().unwrap_or(0.0);
                let variance = (sum_sq / n - m * m).max(0.0);
                (id.clone(), variance.sqrt())
            })
            .collect();
        (mean, std_dev)
    }
}

/// A Monte-Carlo run's segment content key never varies with the rate
/// draw that produced it (spec.md §4.9 keys segments by event identity,
/// not by the rates applied to them), so every run needs its own cache
/// namespace — sharing one across seeds would serve run A's interest
/// postings back to run B.
fn monte_carlo_cache(seed: u32) -> SegmentCache {
    SegmentCache::new(format!("{DEFAULT_CACHE_DIR}/mc-{seed}"), DEFAULT_BYTE_BUDGET)
}

fn run_iteration(
    document: &AccountsAndTransfers,
    base_options: &CalculationOptions,
    seed: u32,
    total_simulations: u32,
    rate_source: &dyn RateSeriesSource,
    variables: &dyn VariableStore,
) -> Result<CalculationResult> {
    let options = CalculationOptions {
        start_date: base_options.start_date,
        end_date: base_options.end_date,
        monte_carlo: true,
        simulation_number: seed,
        total_simulations,
        force_recalculation: base_options.force_recalculation,
    };
    let mut cache = monte_carlo_cache(seed);
    run(document, &options, rate_source, variables, &mut cache)
}

/// Run `config.iterations` independent projections, each drawing its own
/// Monte-Carlo rate path, and summarize the distribution of final
/// balances across the batch (spec.md §1, §6).
///
/// Mirrors the teacher's two-phase `monte_carlo_simulate_with_config`:
/// phase one runs every iteration, keeping only its total final balance
/// (for percentile ranking) while folding the per-account ledger into a
/// running mean/variance accumulator, and phase two re-runs only the
/// iterations that land on a requested percentile to recover their full
/// per-account ledger. Memory stays `O(iterations)` between the phases
/// instead of `O(iterations * ledger size)`. Each iteration owns its own
/// rate draws, timeline, tracker and cache namespace — no state is
/// shared across runs (spec.md §6).
#[instrument(skip_all, fields(iterations = config.iterations))]
pub fn monte_carlo(
    document: &AccountsAndTransfers,
    base_options: &CalculationOptions,
    rate_source: &dyn RateSeriesSource,
    variables: &dyn VariableStore,
    config: &MonteCarloConfig,
) -> Result<MonteCarloResult> {
    let n = config.iterations;

    #[cfg(feature = "parallel")]
    let (mut totals, accumulator): (Vec<(u32, f64)>, MeanAccumulator) = {
        let accumulator = std::sync::Mutex::new(MeanAccumulator::new());
        let totals: Vec<(u32, f64)> = (0..n)
            .into_par_iter()
            .map(|seed| {
                let result = run_iteration(document, base_options, seed, n, rate_source, variables)?;
                let total: f64 = result.final_balances.values().sum();
                {
                    let mut guard = match accumulator.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    guard.accumulate(&result.final_balances);
                }
                Ok((seed, total))
            })
            .collect::<Result<Vec<_>>>()?;
        let accumulator = match accumulator.into_inner() {
            Ok(acc) => acc,
            Err(poisoned) => poisoned.into_inner(),
        };
        (totals, accumulator)
    };

    #[cfg(not(feature = "parallel"))]
    let (mut totals, accumulator): (Vec<(u32, f64)>, MeanAccumulator) = {
        let mut accumulator = MeanAccumulator::new();
        let mut totals = Vec::with_capacity(n as usize);
        for seed in 0..n {
            let result = run_iteration(document, base_options, seed, n, rate_source, variables)?;
            let total: f64 = result.final_balances.values().sum();
            accumulator.accumulate(&result.final_balances);
            totals.push((seed, total));
        }
        (totals, accumulator)
    };

    totals.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let percentile_seeds: Vec<(f64, u32)> = if totals.is_empty() {
        Vec::new()
    } else {
        config
            .percentiles
            .iter()
            .map(|&p| {
                let idx = ((totals.len() as f64 * p).floor() as usize).min(totals.len() - 1);
                (p, totals[idx].0)
            })
            .collect()
    };

    let percentile_runs = percentile_seeds
        .into_iter()
        .map(|(p, seed)| {
            run_iteration(document, base_options, seed, n, rate_source, variables).map(|result| (p, result))
        })
        .collect::<Result<Vec<_>>>()?;

    let iterations = totals.len() as u32;
    let (mean_final_balances, std_dev_final_balances) = accumulator.finish();

    Ok(MonteCarloResult {
        stats: MonteCarloStats { iterations, mean_final_balances, std_dev_final_balances },
        percentile_runs,
    })
}
