//! Canonical study/calendar event model.
//!
//! Pure data plus the two pure operations the rest of the engine builds on:
//! [`overlaps`] and the field-level [`merge`].

mod merge;

pub use merge::{changed_fields, merge, EventField, FieldSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Stable identifier of an event, unique per owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new time-sortable id for a locally created event.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Deterministic id for an event imported from an external calendar.
    ///
    /// Every device importing the same external id for the same owner
    /// derives the same event id, which keeps re-imports idempotent.
    #[must_use]
    pub fn from_external(owner_id: &str, external_id: &str) -> Self {
        let name = format!("studybuddy:{owner_id}:{external_id}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()))
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where an event entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Created or edited by the user on this device
    Local,
    /// Imported from an external calendar
    Imported,
    /// Received from the remote document store (another device)
    Remote,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Imported => "imported",
            Self::Remote => "remote",
        }
    }

    /// Imported data always ranks below user-authored data.
    pub fn is_user_authored(&self) -> bool {
        !matches!(self, Self::Imported)
    }
}

impl FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "imported" => Ok(Self::Imported),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown event source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Lecture, shift, appointment: never moved by the scheduler
    FixedCommitment,
    /// A placed block of study time
    StudySession,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedCommitment => "fixed_commitment",
            Self::StudySession => "study_session",
        }
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed_commitment" | "fixed" => Ok(Self::FixedCommitment),
            "study_session" | "study" => Ok(Self::StudySession),
            other => Err(format!("unknown event category: {other}")),
        }
    }
}

/// A study or calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub owner_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: EventSource,
    /// Remote revision this copy was last committed at (bumped locally on edit)
    pub revision: u64,
    /// Caller-supplied edit time; only used for human-facing tie-breaks
    pub last_modified: DateTime<Utc>,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
    pub category: EventCategory,
    /// Identifier in the external calendar this event was imported from
    #[serde(default)]
    pub external_id: Option<String>,
    /// Course module the event belongs to
    #[serde(default)]
    pub module_id: Option<String>,
}

impl Event {
    /// Create a new local event. Call [`Event::validate`] before storing.
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: EventCategory,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            owner_id: owner_id.into(),
            title: title.into(),
            start,
            end,
            source: EventSource::Local,
            revision: 0,
            last_modified,
            deleted: false,
            category,
            external_id: None,
            module_id: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Check the event invariants: `end > start` and a non-blank title and owner.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.end <= self.start {
            return Err(self.malformed(format!(
                "end ({}) must be after start ({})",
                self.end, self.start
            )));
        }
        if self.title.trim().is_empty() {
            return Err(self.malformed("title must not be empty".to_string()));
        }
        if self.owner_id.trim().is_empty() {
            return Err(self.malformed("owner_id must not be empty".to_string()));
        }
        Ok(())
    }

    fn malformed(&self, message: String) -> CoreError {
        CoreError::MalformedPayload {
            id: self.id,
            message,
        }
    }

    /// True if the event intersects the half-open range `[start, end)`.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    /// Same user-visible state, ignoring revision bookkeeping and source.
    ///
    /// A remote copy equal in content to a pending local payload means the
    /// local write already landed.
    pub fn same_content(&self, other: &Event) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.start == other.start
            && self.end == other.end
            && self.category == other.category
            && self.module_id == other.module_id
            && self.external_id == other.external_id
            && self.deleted == other.deleted
            && self.last_modified == other.last_modified
    }

    /// Total order over content, used as the last-resort tie-break between
    /// two payloads carrying identical timestamps.
    pub fn cmp_content(&self, other: &Event) -> Ordering {
        let key = |e: &Event| {
            (
                e.id,
                e.title.clone(),
                e.start,
                e.end,
                e.category,
                e.source,
                e.module_id.clone(),
                e.deleted,
            )
        };
        key(self).cmp(&key(other))
    }
}

/// True iff the two events share any instant: `a.start < b.end && b.start < a.end`.
pub fn overlaps(a: &Event, b: &Event) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new("owner-1", "Lecture", start, end, EventCategory::FixedCommitment, at(0, 0))
    }

    #[test]
    fn test_overlaps_is_reflexive_and_symmetric() {
        let a = event(at(9, 0), at(10, 0));
        let b = event(at(9, 30), at(11, 0));
        assert!(overlaps(&a, &a));
        assert!(overlaps(&a, &b));
        assert!(overlaps(&b, &a));
    }

    #[test]
    fn test_adjacent_events_do_not_overlap() {
        let a = event(at(9, 0), at(10, 0));
        let b = event(at(10, 0), at(11, 0));
        assert!(!overlaps(&a, &b));
        assert!(!overlaps(&b, &a));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let bad = event(at(10, 0), at(9, 0));
        assert!(matches!(
            bad.validate(),
            Err(CoreError::MalformedPayload { .. })
        ));

        let empty = event(at(9, 0), at(9, 0));
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let mut e = event(at(9, 0), at(10, 0));
        e.title = "   ".to_string();
        assert!(e.validate().is_err());
    }

    #[test]
    fn test_external_ids_are_deterministic_per_owner() {
        let a = EventId::from_external("owner-1", "cal-42");
        let b = EventId::from_external("owner-1", "cal-42");
        let other_owner = EventId::from_external("owner-2", "cal-42");
        assert_eq!(a, b);
        assert_ne!(a, other_owner);
    }

    #[test]
    fn test_event_id_parse_roundtrip() {
        let id = EventId::new();
        let parsed: EventId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_same_content_ignores_revision_and_source() {
        let a = event(at(9, 0), at(10, 0));
        let b = a.clone().with_revision(7).with_source(EventSource::Remote);
        assert!(a.same_content(&b));

        let mut c = a.clone();
        c.title = "Tutorial".to_string();
        assert!(!a.same_content(&c));
    }

    #[test]
    fn test_category_from_str_accepts_short_names() {
        assert_eq!("fixed".parse::<EventCategory>().unwrap(), EventCategory::FixedCommitment);
        assert_eq!("study_session".parse::<EventCategory>().unwrap(), EventCategory::StudySession);
        assert!("meeting".parse::<EventCategory>().is_err());
    }
}
