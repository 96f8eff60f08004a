//! Data model: ids, accounts, schedules, events, and the segment/snapshot
//! types the engine partitions and caches the timeline with.

pub mod account;
pub mod amount;
pub mod event;
pub mod ids;
pub mod pension;
pub mod posting;
pub mod rmd;
pub mod schedule;
pub mod segment;
pub mod snapshot;
pub mod social_security;

pub use account::{Account, AccountType, PushPullPolicy, RetirementAttributes};
pub use amount::{Amount, AmountToken};
pub use event::{Event, EventKind, EventPayload};
pub use ids::{AccountId, EventId, ScheduleId};
pub use pension::PensionSchedule;
pub use posting::Posting;
pub use schedule::{Bill, Interest, Transfer};
pub use segment::Segment;
pub use snapshot::{InterestState, Snapshot};
pub use social_security::SocialSecuritySchedule;
