//! The balance tracker (spec.md §4.6): the only place account balances
//! live while the engine walks the timeline.

use jiff::civil::Date;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::CachedSegment;
use crate::error::EngineWarning;
use crate::model::account::Account;
use crate::model::ids::{AccountId, EventId, ScheduleId};
use crate::model::posting::Posting;
use crate::model::snapshot::{InterestState, Snapshot};

/// Default snapshot cadence (spec.md §4.6): a snapshot is taken whenever
/// at least this many days have passed since the last one, so a cache hit
/// deep in the timeline can resume without replaying from day one.
pub const DEFAULT_SNAPSHOT_INTERVAL_DAYS: i32 = 30;

/// The output of processing one event: zero or more postings plus any
/// interest-state advances and non-fatal warnings it produced. Produced
/// by `calculator`, applied by the tracker.
#[derive(Debug, Default)]
pub struct SegmentDelta {
    pub postings: Vec<Posting>,
    pub interest_state_updates: FxHashMap<ScheduleId, InterestState>,
    pub warnings: Vec<EngineWarning>,
}

#[derive(Clone)]
pub struct BalanceTracker {
    balances: FxHashMap<AccountId, f64>,
    minimums: FxHashMap<AccountId, f64>,
    postings: FxHashMap<AccountId, Vec<Posting>>,
    interest_states: FxHashMap<ScheduleId, InterestState>,
    processed_event_ids: FxHashSet<EventId>,
    snapshot_interval_days: i32,
    last_snapshot_date: Option<Date>,
    warnings: Vec<EngineWarning>,
}

impl BalanceTracker {
    #[must_use]
    pub fn initialize(accounts: &[Account]) -> Self {
        let mut balances = FxHashMap::default();
        let mut minimums = FxHashMap::default();
        let mut postings = FxHashMap::default();
        for account in accounts {
            balances.insert(account.id.clone(), 0.0);
            minimums.insert(account.id.clone(), account.minimum_balance());
            postings.insert(account.id.clone(), Vec::new());
        }
        BalanceTracker {
            balances,
            minimums,
            postings,
            interest_states: FxHashMap::default(),
            processed_event_ids: FxHashSet::default(),
            snapshot_interval_days: DEFAULT_SNAPSHOT_INTERVAL_DAYS,
            last_snapshot_date: None,
            warnings: Vec::new(),
        }
    }

    /// A cheap independent copy used to project a future segment's
    /// trajectory without disturbing the real tracker (spec.md §4.8: the
    /// push/pull processor "simulates the next month cheaply from the
    /// already-expanded event stream" rather than deep-copying the whole
    /// account graph). Balances/postings/interest-states here are all
    /// primitives or small records, so this is `O(accounts + postings)`.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    #[must_use]
    pub fn balance(&self, account: &AccountId) -> f64 {
        self.balances.get(account).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn interest_state(&self, schedule: &ScheduleId) -> Option<&InterestState> {
        self.interest_states.get(schedule)
    }

    #[must_use]
    pub fn warnings(&self) -> &[EngineWarning] {
        &self.warnings
    }

    /// Apply one event's delta: post each entry against its account's
    /// running balance, fold in interest-state advances, and run the
    /// minimum-balance check (skipped for accounts that allow a negative
    /// balance, e.g. credit cards).
    pub fn apply_segment_delta(&mut self, mut delta: SegmentDelta, event_id: EventId) {
        for mut posting in delta.postings.drain(..) {
            let account = posting.account.clone();
            let balance = self.balances.entry(account.clone()).or_insert(0.0);
            *balance += posting.amount;
            posting.balance = *balance;
            self.check_minimum_balance(&account, posting.date);
            self.postings.entry(account).or_default().push(posting);
        }

        for (schedule, state) in delta.interest_state_updates {
            self.interest_states.insert(schedule, state);
        }

        self.warnings.append(&mut delta.warnings);
        self.processed_event_ids.insert(event_id);
    }

    fn check_minimum_balance(&mut self, account: &AccountId, date: Date) {
        let minimum = self.minimums.get(account).copied().unwrap_or(0.0);
        if minimum.is_infinite() {
            return;
        }
        let balance = self.balance(account);
        if balance < minimum {
            self.warnings.push(EngineWarning::BalanceBelowMinimum {
                account: account.clone(),
                date,
                balance,
                minimum,
            });
        }
    }

    /// Take a snapshot if at least `snapshot_interval_days` have passed
    /// since the last one (or none has been taken yet).
    pub fn create_snapshot_if_needed(&mut self, date: Date, data_hash: &str) -> Option<Snapshot> {
        let due = match self.last_snapshot_date {
            None => true,
            Some(last) => crate::date_math::fast_days_between(last, date) >= self.snapshot_interval_days,
        };
        if !due {
            return None;
        }
        self.last_snapshot_date = Some(date);
        Some(self.snapshot(date, data_hash.to_string()))
    }

    #[must_use]
    pub fn snapshot(&self, date: Date, data_hash: String) -> Snapshot {
        let activity_indices = self
            .postings
            .iter()
            .map(|(account, postings)| (account.clone(), postings.len()))
            .collect();
        Snapshot {
            date,
            balances: self.balances.clone(),
            activity_indices,
            interest_states: self.interest_states.clone(),
            data_hash,
            processed_event_ids: self.processed_event_ids.clone(),
        }
    }

    pub fn restore_snapshot(&mut self, snapshot: &Snapshot) {
        self.balances = snapshot.balances.clone();
        self.interest_states = snapshot.interest_states.clone();
        self.processed_event_ids = snapshot.processed_event_ids.clone();
        self.last_snapshot_date = Some(snapshot.date);
        for (account, postings) in &mut self.postings {
            let keep = snapshot.activity_indices.get(account).copied().unwrap_or(0);
            postings.truncate(keep);
        }
    }

    /// Adopt a cache hit: unlike `restore_snapshot` (which rolls the
    /// tracker *back* to an earlier point by truncating), this rolls the
    /// tracker *forward* by splicing the segment's already-computed
    /// postings onto each account's ledger and adopting its ending
    /// balances/interest state, without re-running any event handler
    /// (spec.md §4.9 cache path). Without this, a cache hit would leave
    /// `postings` empty for the segment even though `balances` advanced,
    /// so `finalize()` would silently drop the segment's ledger entries.
    pub fn apply_cached_segment(&mut self, cached: &CachedSegment) {
        for (account, postings) in &cached.postings {
            self.postings.entry(account.clone()).or_default().extend(postings.iter().cloned());
        }
        self.balances = cached.snapshot.balances.clone();
        for (schedule, state) in &cached.snapshot.interest_states {
            self.interest_states.insert(schedule.clone(), state.clone());
        }
        self.processed_event_ids.extend(cached.snapshot.processed_event_ids.iter().cloned());
        self.last_snapshot_date = Some(cached.snapshot.date);
    }

    /// Postings already committed against one account within `[start, end]`
    /// inclusive, in posted order. Used by the Tax handler to find the
    /// prior calendar year's retirement withdrawals without re-deriving
    /// them from the event stream.
    #[must_use]
    pub fn postings_in_range(&self, account: &AccountId, start: Date, end: Date) -> Vec<&Posting> {
        self.postings
            .get(account)
            .map(|postings| postings.iter().filter(|p| p.date >= start && p.date <= end).collect())
            .unwrap_or_default()
    }

    /// Collect postings per account, optionally filtered to `[start, end]`
    /// inclusive (spec.md §4.6 finalise), in time-posted order.
    #[must_use]
    pub fn finalize(
        &self,
        start_window: Option<Date>,
        end_window: Option<Date>,
    ) -> FxHashMap<AccountId, Vec<Posting>> {
        self.postings
            .iter()
            .map(|(account, postings)| {
                let filtered = postings
                    .iter()
                    .filter(|p| start_window.is_none_or(|s| p.date >= s))
                    .filter(|p| end_window.is_none_or(|e| p.date <= e))
                    .cloned()
                    .collect();
                (account.clone(), filtered)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::account::AccountType;
    use jiff::civil::date;

    fn account(id: &str, account_type: AccountType) -> Account {
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

    fn posting(account: &str, amount: f64, d: Date) -> Posting {
        Posting {
            id: EventId::new("e1"),
            name: "test".to_string(),
            account: AccountId::new(account),
            amount,
            date: d,
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
        }
    }

    #[test]
    fn apply_delta_updates_running_balance() {
        let mut tracker = BalanceTracker::initialize(&[account("checking", AccountType::Checking)]);
        let delta = SegmentDelta {
            postings: vec![posting("checking", 100.0, date(2025, 1, 1))],
            interest_state_updates: FxHashMap::default(),
            warnings: Vec::new(),
        };
        tracker.apply_segment_delta(delta, EventId::new("e1"));
        assert_eq!(tracker.balance(&AccountId::new("checking")), 100.0);
    }

    #[test]
    fn negative_balance_on_checking_warns() {
        let mut tracker = BalanceTracker::initialize(&[account("checking", AccountType::Checking)]);
        let delta = SegmentDelta {
            postings: vec![posting("checking", -50.0, date(2025, 1, 1))],
            interest_state_updates: FxHashMap::default(),
            warnings: Vec::new(),
        };
        tracker.apply_segment_delta(delta, EventId::new("e1"));
        assert_eq!(tracker.warnings().len(), 1);
    }

    #[test]
    fn negative_balance_on_credit_card_does_not_warn() {
        let mut tracker = BalanceTracker::initialize(&[account("visa", AccountType::CreditCard)]);
        let delta = SegmentDelta {
            postings: vec![posting("visa", -50.0, date(2025, 1, 1))],
            interest_state_updates: FxHashMap::default(),
            warnings: Vec::new(),
        };
        tracker.apply_segment_delta(delta, EventId::new("e1"));
        assert!(tracker.warnings().is_empty());
    }

    #[test]
    fn snapshot_restore_rolls_back_balance_and_postings() {
        let mut tracker = BalanceTracker::initialize(&[account("checking", AccountType::Checking)]);
        tracker.apply_segment_delta(
            SegmentDelta {
                postings: vec![posting("checking", 100.0, date(2025, 1, 1))],
                interest_state_updates: FxHashMap::default(),
                warnings: Vec::new(),
            },
            EventId::new("e1"),
        );
        let snap = tracker.snapshot(date(2025, 1, 1), "hash".to_string());

        tracker.apply_segment_delta(
            SegmentDelta {
                postings: vec![posting("checking", 50.0, date(2025, 1, 5))],
                interest_state_updates: FxHashMap::default(),
                warnings: Vec::new(),
            },
            EventId::new("e2"),
        );
        assert_eq!(tracker.balance(&AccountId::new("checking")), 150.0);

        tracker.restore_snapshot(&snap);
        assert_eq!(tracker.balance(&AccountId::new("checking")), 100.0);
    }

    #[test]
    fn apply_cached_segment_splices_postings_and_adopts_balance() {
        let mut tracker = BalanceTracker::initialize(&[account("checking", AccountType::Checking)]);
        let checking = AccountId::new("checking");

        let cached_posting = posting("checking", 75.0, date(2025, 2, 10));
        let mut balances = FxHashMap::default();
        balances.insert(checking.clone(), 75.0);
        let mut activity_indices = FxHashMap::default();
        activity_indices.insert(checking.clone(), 1);
        let cached = CachedSegment {
            snapshot: Snapshot {
                date: date(2025, 3, 1),
                balances,
                activity_indices,
                interest_states: FxHashMap::default(),
                data_hash: "seg-key".to_string(),
                processed_event_ids: FxHashSet::from_iter([EventId::new("e1")]),
            },
            postings: FxHashMap::from_iter([(checking.clone(), vec![cached_posting])]),
        };

        tracker.apply_cached_segment(&cached);

        assert_eq!(tracker.balance(&checking), 75.0);
        let finalized = tracker.finalize(None, None);
        assert_eq!(finalized[&checking].len(), 1, "cache hit must not leave the ledger empty");
        assert_eq!(finalized[&checking][0].amount, 75.0);
    }
}
