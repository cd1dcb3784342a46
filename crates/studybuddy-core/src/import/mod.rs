//! External calendar import.
//!
//! Importers yield [`ExternalEvent`]s for a time range; [`import_into`]
//! folds them into the local store as `Imported` events keyed by their
//! external id, so running the same import twice changes nothing.

mod json;
mod timetable;

pub use json::JsonImporter;
pub use timetable::{TimetableSlot, WeeklyTimetable};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, ValidationError};
use crate::event::{Event, EventCategory, EventSource};
use crate::storage::{ImportOutcome, LocalStore};

/// One event as an external calendar describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub external_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_category")]
    pub category: EventCategory,
    #[serde(default)]
    pub module_id: Option<String>,
    /// Edit time reported by the source, if it has one
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

fn default_category() -> EventCategory {
    EventCategory::FixedCommitment
}

impl ExternalEvent {
    /// Local representation; `at` stands in for a missing source timestamp.
    pub fn to_event(&self, owner_id: &str, at: DateTime<Utc>) -> Event {
        let mut event = Event::new(
            owner_id,
            self.title.clone(),
            self.start,
            self.end,
            self.category,
            self.last_modified.unwrap_or(at),
        )
        .with_source(EventSource::Imported);
        event.external_id = Some(self.external_id.clone());
        event.module_id = self.module_id.clone();
        event
    }
}

/// A source of external calendar events.
pub trait CalendarImporter {
    /// Short name used in logs and summaries (e.g. "json", "timetable").
    fn name(&self) -> &str;

    /// Events intersecting `[start, end)`. The sequence is finite.
    fn fetch<'a>(
        &'a self,
        owner_id: &'a str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Box<dyn Iterator<Item = ExternalEvent> + 'a>>;
}

/// An external event the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidImport {
    pub external_id: String,
    pub reason: String,
}

/// Per-outcome counts for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub source: String,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub shadowed: usize,
    pub invalid: Vec<InvalidImport>,
}

impl ImportSummary {
    fn record(&mut self, outcome: ImportOutcome) {
        match outcome {
            ImportOutcome::Inserted => self.inserted += 1,
            ImportOutcome::Updated => self.updated += 1,
            ImportOutcome::Unchanged => self.unchanged += 1,
            ImportOutcome::Shadowed => self.shadowed += 1,
        }
    }

    /// Number of events that became new pending changes.
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Import everything `importer` yields for the range into `owner_id`'s partition.
///
/// Invalid external events are reported in the summary and skipped; storage
/// failures abort the run.
pub fn import_into(
    store: &LocalStore,
    owner_id: &str,
    importer: &dyn CalendarImporter,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    at: DateTime<Utc>,
) -> Result<ImportSummary> {
    if end <= start {
        return Err(ValidationError::InvalidTimeRange { start, end }.into());
    }

    let mut summary = ImportSummary {
        source: importer.name().to_string(),
        ..ImportSummary::default()
    };

    for external in importer.fetch(owner_id, start, end)? {
        match store.import_external(owner_id, external.to_event(owner_id, at)) {
            Ok(outcome) => summary.record(outcome),
            Err(err @ (CoreError::Validation(_) | CoreError::MalformedPayload { .. })) => {
                tracing::warn!(
                    external_id = %external.external_id,
                    error = %err,
                    "skipping invalid external event"
                );
                summary.invalid.push(InvalidImport {
                    external_id: external.external_id,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!(
        owner = owner_id,
        source = %summary.source,
        inserted = summary.inserted,
        updated = summary.updated,
        unchanged = summary.unchanged,
        shadowed = summary.shadowed,
        invalid = summary.invalid.len(),
        "import finished"
    );
    Ok(summary)
}
