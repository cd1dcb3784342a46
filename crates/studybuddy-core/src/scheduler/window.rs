//! Busy intervals and free gaps over a time range.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// A span of time already taken by a fixed commitment or placed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Sort and coalesce intervals that overlap or touch.
pub fn merge_busy(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    intervals.retain(|i| i.end > i.start);
    intervals.sort();

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Derived view of one owner's occupied time within a range.
///
/// Recomputed from the event set whenever it is needed; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub owner_id: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    /// Ordered, non-overlapping, non-adjacent
    pub busy: Vec<BusyInterval>,
}

impl ScheduleWindow {
    /// Busy time from the non-deleted events of `owner_id` inside the range,
    /// clipped to it.
    pub fn build(
        owner_id: impl Into<String>,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        events: &[Event],
    ) -> Self {
        let owner_id = owner_id.into();
        let busy = events
            .iter()
            .filter(|e| !e.deleted && e.owner_id == owner_id && e.intersects(range_start, range_end))
            .map(|e| BusyInterval::new(e.start.max(range_start), e.end.min(range_end)))
            .collect();

        Self {
            owner_id,
            range_start,
            range_end,
            busy: merge_busy(busy),
        }
    }

    /// Window spanning every non-deleted event; `None` when there are none.
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let live: Vec<&Event> = events.iter().filter(|e| !e.deleted).collect();
        let first = live.first()?;
        let range_start = live.iter().map(|e| e.start).min()?;
        let range_end = live.iter().map(|e| e.end).max()?;
        Some(Self::build(first.owner_id.clone(), range_start, range_end, events))
    }

    /// Free time between the busy intervals, in chronological order.
    pub fn free_gaps(&self) -> Vec<BusyInterval> {
        let mut gaps = Vec::new();
        let mut last_end = self.range_start;

        for busy in &self.busy {
            if busy.start > last_end {
                gaps.push(BusyInterval::new(last_end, busy.start));
            }
            last_end = last_end.max(busy.end);
        }

        if last_end < self.range_end {
            gaps.push(BusyInterval::new(last_end, self.range_end));
        }
        gaps
    }

    pub fn busy_duration(&self) -> Duration {
        self.busy
            .iter()
            .fold(Duration::zero(), |total, b| total + b.duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventCategory;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new("alice", "Busy", start, end, EventCategory::FixedCommitment, at(0, 0))
    }

    #[test]
    fn test_merge_busy_coalesces_overlapping_and_adjacent() {
        let merged = merge_busy(vec![
            BusyInterval::new(at(11, 0), at(12, 0)),
            BusyInterval::new(at(9, 0), at(10, 0)),
            BusyInterval::new(at(10, 0), at(10, 30)),
            BusyInterval::new(at(9, 30), at(9, 45)),
        ]);
        assert_eq!(
            merged,
            vec![
                BusyInterval::new(at(9, 0), at(10, 30)),
                BusyInterval::new(at(11, 0), at(12, 0)),
            ]
        );
    }

    #[test]
    fn test_build_clips_to_range_and_skips_deleted() {
        let mut gone = event(at(10, 0), at(11, 0));
        gone.deleted = true;
        let events = vec![event(at(7, 0), at(9, 0)), gone, event(at(11, 30), at(13, 0))];

        let window = ScheduleWindow::build("alice", at(8, 0), at(12, 0), &events);
        assert_eq!(
            window.busy,
            vec![
                BusyInterval::new(at(8, 0), at(9, 0)),
                BusyInterval::new(at(11, 30), at(12, 0)),
            ]
        );
        assert_eq!(window.busy_duration(), Duration::minutes(90));
    }

    #[test]
    fn test_free_gaps_cover_the_rest_of_the_range() {
        let events = vec![event(at(9, 0), at(10, 0))];
        let window = ScheduleWindow::build("alice", at(8, 0), at(12, 0), &events);
        assert_eq!(
            window.free_gaps(),
            vec![
                BusyInterval::new(at(8, 0), at(9, 0)),
                BusyInterval::new(at(10, 0), at(12, 0)),
            ]
        );
    }

    #[test]
    fn test_from_events_spans_all_live_events() {
        assert!(ScheduleWindow::from_events(&[]).is_none());

        let window = ScheduleWindow::from_events(&[event(at(13, 0), at(14, 0)), event(at(9, 0), at(10, 0))])
            .unwrap();
        assert_eq!(window.range_start, at(9, 0));
        assert_eq!(window.range_end, at(14, 0));
        assert_eq!(window.free_gaps(), vec![BusyInterval::new(at(10, 0), at(13, 0))]);
    }
}
