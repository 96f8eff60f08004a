//! Monthly partitions of the event timeline, the cache's unit of work
//! (spec.md §4.3, §4.9).

use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A half-open `[start, end)` window over the timeline's sorted events,
/// addressed by a content key so identical segments across Monte-Carlo
/// runs hit the same cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start: Date,
    pub end: Date,
    /// Indices into the owning timeline's sorted event vector, in order.
    pub event_indices: Vec<usize>,
    pub content_key: String,
}

impl Segment {
    /// `"{eventCount}|{firstDate}|{lastDate}|{sha256_16(eventIds)}"`
    /// (spec.md §4.3): the count and date bounds make near-misses cheap to
    /// reject before touching the hash, and `sha256_16` folds in full
    /// event identity so reordered-but-same-count segments don't collide.
    #[must_use]
    pub fn compute_content_key(start: Date, end: Date, ordered_event_ids: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for id in ordered_event_ids {
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        let digest = hasher.finalize();
        let short: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        format!("{}|{}|{}|{}", ordered_event_ids.len(), start, end, short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;

    #[test]
    fn content_key_is_stable_for_same_input() {
        let a = Segment::compute_content_key(date(2025, 1, 1), date(2025, 2, 1), &["e1", "e2"]);
        let b = Segment::compute_content_key(date(2025, 1, 1), date(2025, 2, 1), &["e1", "e2"]);
        assert_eq!(a, b);
    }

    #[test]
    fn content_key_differs_on_event_order() {
        let a = Segment::compute_content_key(date(2025, 1, 1), date(2025, 2, 1), &["e1", "e2"]);
        let b = Segment::compute_content_key(date(2025, 1, 1), date(2025, 2, 1), &["e2", "e1"]);
        assert_ne!(a, b, "reordering events should change the content key");
    }
}
