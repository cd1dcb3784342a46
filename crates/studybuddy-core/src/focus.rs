//! Completed focus sessions.
//!
//! A focus run alternates study and break phases for a number of cycles.
//! Once the last break ends the run is recorded as a single `StudySession`
//! event covering the whole run, so the scheduler treats that time as busy
//! and the session syncs like any other local edit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::event::{Event, EventCategory};
use crate::storage::LocalStore;

pub const DEFAULT_STUDY_MINS: u32 = 25;
pub const DEFAULT_BREAK_MINS: u32 = 5;
pub const DEFAULT_ITERATIONS: u32 = 4;

/// A finished focus run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub study_mins_per_cycle: u32,
    /// Zero skips the breaks entirely
    pub break_mins_per_cycle: u32,
    pub iterations: u32,
    pub completed_at: DateTime<Utc>,
    pub title: Option<String>,
    pub module_id: Option<String>,
}

impl FocusSession {
    pub fn new(study_mins_per_cycle: u32, break_mins_per_cycle: u32, iterations: u32, completed_at: DateTime<Utc>) -> Self {
        Self {
            study_mins_per_cycle,
            break_mins_per_cycle,
            iterations,
            completed_at,
            title: None,
            module_id: None,
        }
    }

    /// 4 cycles of 25 minutes study and 5 minutes break.
    pub fn standard(completed_at: DateTime<Utc>) -> Self {
        Self::new(DEFAULT_STUDY_MINS, DEFAULT_BREAK_MINS, DEFAULT_ITERATIONS, completed_at)
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.study_mins_per_cycle == 0 {
            return Err(ValidationError::InvalidValue {
                field: "study_mins_per_cycle".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.iterations == 0 {
            return Err(ValidationError::InvalidValue {
                field: "iterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Study time only, breaks excluded.
    pub fn study_time(&self) -> Duration {
        Duration::minutes(i64::from(self.study_mins_per_cycle) * i64::from(self.iterations))
    }

    /// Wall-clock length of the run, breaks included.
    pub fn span(&self) -> Duration {
        let per_cycle = i64::from(self.study_mins_per_cycle) + i64::from(self.break_mins_per_cycle);
        Duration::minutes(per_cycle * i64::from(self.iterations))
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.completed_at - self.span()
    }

    /// The run as a study-session event ending at `completed_at`.
    pub fn to_event(&self, owner_id: &str, default_title: &str) -> Event {
        let title = self.title.clone().unwrap_or_else(|| default_title.to_string());
        let mut event = Event::new(
            owner_id,
            title,
            self.started_at(),
            self.completed_at,
            EventCategory::StudySession,
            self.completed_at,
        );
        event.module_id = self.module_id.clone();
        event
    }
}

/// Validate `session` and store it as a local study-session event.
pub fn record_focus_session(
    store: &LocalStore,
    owner_id: &str,
    session: &FocusSession,
    default_title: &str,
) -> Result<Event> {
    session.validate()?;
    let stored = store.upsert(session.to_event(owner_id, default_title))?;
    tracing::info!(
        owner = owner_id,
        event_id = %stored.id,
        study_mins = session.study_time().num_minutes(),
        iterations = session.iterations,
        "focus session recorded"
    );
    Ok(stored)
}
