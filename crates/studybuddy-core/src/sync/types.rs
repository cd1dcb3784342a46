//! Core types for reconciliation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::event::{Event, EventId};
use crate::scheduler::ScheduleWindow;
use crate::storage::ChangeOp;
use crate::sync::conflict_resolver::Resolution;

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote {operation} timed out after {after_ms} ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// Only ever seen inside a cycle; resolved before the caller sees a report
    #[error("Revision conflict on event {id}")]
    RevisionConflict { id: EventId },

    #[error("Malformed remote payload: {0}")]
    Malformed(String),

    #[error("Sync cycle cancelled")]
    Cancelled,

    #[error("Local store error: {0}")]
    Store(#[source] Box<CoreError>),
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        SyncError::Store(Box::new(err))
    }
}

impl SyncError {
    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Timeout { .. })
    }
}

/// A pending local change that met a diverged remote copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    pub event_id: EventId,
    pub local_op: ChangeOp,
    pub local: Event,
    pub remote: Event,
    pub resolution: Resolution,
    /// Cycle clock at detection; informational, never used for ordering
    pub detected_at: DateTime<Utc>,
}

/// A fetched remote document that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEvent {
    pub event_id: EventId,
    pub revision: u64,
    pub reason: String,
}

/// Outcome of one reconciliation cycle for one owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub owner_id: String,
    pub started_at: DateTime<Utc>,
    /// Local changes written to the remote store
    pub pushed: usize,
    /// Remote documents applied locally
    pub pulled: usize,
    pub conflicts: Vec<ConflictRecord>,
    /// Conflicts settled by a field-level merge
    pub merged: usize,
    pub requeued: Vec<EventId>,
    pub quarantined: Vec<EventId>,
    pub rejected: Vec<RejectedEvent>,
    pub watermark_before: u64,
    pub watermark_after: u64,
    pub cancelled: bool,
    /// Every fetched id and every pending change was settled this cycle
    pub complete: bool,
    /// Extent of the owner's events after the cycle
    pub window: Option<ScheduleWindow>,
}

impl SyncReport {
    pub fn new(owner_id: impl Into<String>, watermark: u64) -> Self {
        Self {
            owner_id: owner_id.into(),
            started_at: Utc::now(),
            watermark_before: watermark,
            watermark_after: watermark,
            ..Self::default()
        }
    }

    /// True when the cycle neither pushed nor pulled anything.
    pub fn is_noop(&self) -> bool {
        self.pushed == 0
            && self.pulled == 0
            && self.conflicts.is_empty()
            && self.watermark_before == self.watermark_after
    }
}
