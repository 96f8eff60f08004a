//! Identifiers for simulation entities
//!
//! Accounts, bills, interests, and transfers are declared with string ids
//! in the caller's document. We wrap them in typed newtypes around `Arc<str>`
//! so that every map keyed on an id is a cheap-to-hash, cheap-to-clone
//! pointer rather than a fresh `String` allocation, while keeping type
//! safety between the different id spaces (an `AccountId` can never be
//! passed where a `ScheduleId` is expected).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Arc<str>);

        impl $name {
            #[must_use]
            pub fn new(s: impl Into<Arc<str>>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }
    };
}

string_id!(AccountId);
string_id!(ScheduleId);

/// Stable identifier for a single expanded event.
///
/// Built deterministically from the owning schedule id, event kind and
/// date so that two runs of the expander over the same input produce byte
/// identical ids (§8 property 6, idempotence under cache). Lexicographic
/// ordering on this id is the final tie-break in the timeline sort key
/// (spec.md §4.4, §5).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Arc<str>);

impl EventId {
    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
