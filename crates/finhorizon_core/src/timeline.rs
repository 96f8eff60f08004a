//! The totally-ordered event stream and its monthly segment partition
//! (spec.md §4.3, §4.4).

use std::collections::BTreeMap;

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::date_math::next_month_start;
use crate::error::{EngineError, Result};
use crate::model::event::Event;
use crate::model::ids::EventId;
use crate::model::segment::Segment;

/// Expansion safety cap (spec.md §4.2): a misconfigured schedule (e.g. a
/// zero-length period) would otherwise expand forever.
pub const MAX_EVENTS: usize = 10_000;

pub struct Timeline {
    /// Sorted by `(date, priority, stableEventId)` — the engine's single
    /// source of processing order.
    events: Vec<Event>,
    index_by_id: FxHashMap<EventId, usize>,
    by_date: BTreeMap<Date, Vec<usize>>,
    segments: Vec<Segment>,
}

impl Timeline {
    pub fn new(mut events: Vec<Event>) -> Result<Self> {
        if events.len() > MAX_EVENTS {
            return Err(EngineError::Configuration {
                schedule: crate::model::ScheduleId::new("*"),
                message: format!("timeline expansion exceeded {MAX_EVENTS} events"),
            });
        }
        events.sort();
        let mut timeline = Timeline {
            events,
            index_by_id: FxHashMap::default(),
            by_date: BTreeMap::new(),
            segments: Vec::new(),
        };
        timeline.rebuild_indices();
        timeline.partition_into_segments()?;
        Ok(timeline)
    }

    fn rebuild_indices(&mut self) {
        self.index_by_id.clear();
        self.by_date.clear();
        for (idx, event) in self.events.iter().enumerate() {
            self.index_by_id.insert(event.id.clone(), idx);
            self.by_date.entry(event.date).or_default().push(idx);
        }
    }

    /// Partition the sorted events into half-open `[monthStart, nextMonthStart)`
    /// windows, one per calendar month touched by the timeline.
    fn partition_into_segments(&mut self) -> Result<()> {
        self.segments.clear();
        if self.events.is_empty() {
            return Ok(());
        }

        let mut cursor_start = 0usize;
        let mut window_start = crate::date_math::month_start(self.events[0].date);
        let mut window_end = next_month_start(window_start);

        for idx in 0..self.events.len() {
            while self.events[idx].date >= window_end {
                self.push_segment(cursor_start, idx, window_start, window_end)?;
                cursor_start = idx;
                window_start = window_end;
                window_end = next_month_start(window_start);
            }
        }
        self.push_segment(cursor_start, self.events.len(), window_start, window_end)?;
        Ok(())
    }

    fn push_segment(&mut self, start_idx: usize, end_idx: usize, start: Date, end: Date) -> Result<()> {
        if let Some(last) = self.segments.last() {
            if last.end > start {
                return Err(EngineError::OverlappingSegments);
            }
        }
        let indices: Vec<usize> = (start_idx..end_idx).collect();
        let ids: Vec<&str> = indices.iter().map(|&i| self.events[i].id.as_str()).collect();
        let content_key = Segment::compute_content_key(start, end, &ids);
        self.segments.push(Segment { start, end, event_indices: indices, content_key });
        Ok(())
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn event_by_id(&self, id: &EventId) -> Option<&Event> {
        self.index_by_id.get(id).map(|&idx| &self.events[idx])
    }

    /// Insert retroactive events (push/pull insertions, spec.md §4.8) into
    /// the stream and rebuild the sort order, indices, and segment
    /// partition. The caller is responsible for bounding how many times
    /// this runs per calculation (spec.md: "replay a segment at most
    /// once per retroactive insert").
    pub fn add_retroactive_events(&mut self, new_events: Vec<Event>) -> Result<()> {
        self.events.extend(new_events);
        if self.events.len() > MAX_EVENTS {
            return Err(EngineError::Configuration {
                schedule: crate::model::ScheduleId::new("*"),
                message: format!("timeline exceeded {MAX_EVENTS} events after retroactive insert"),
            });
        }
        self.events.sort();
        self.rebuild_indices();
        self.partition_into_segments()
    }
}
