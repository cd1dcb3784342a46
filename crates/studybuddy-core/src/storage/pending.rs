//! Pending-change queue entries and the audit log of losing payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::event::{Event, EventId};

/// Kind of local mutation waiting to reach the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Upsert,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for ChangeOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown change op: {other}")),
        }
    }
}

/// Delivery state of a pending change.
///
/// `Pending → InFlight → (committed, removed) | Requeued | Quarantined`.
/// A requeued change is picked up again by the next cycle; a quarantined one
/// waits for the user to edit or release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    Pending,
    InFlight,
    Requeued,
    Quarantined,
}

impl ChangeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Requeued => "requeued",
            Self::Quarantined => "quarantined",
        }
    }

    /// Whether the next reconciliation cycle should attempt this change.
    pub fn is_deliverable(&self) -> bool {
        !matches!(self, Self::Quarantined)
    }
}

impl FromStr for ChangeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "requeued" => Ok(Self::Requeued),
            "quarantined" => Ok(Self::Quarantined),
            other => Err(format!("unknown change state: {other}")),
        }
    }
}

/// A local mutation not yet confirmed by the remote store.
///
/// There is at most one per event id; later edits coalesce into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub event_id: EventId,
    pub op: ChangeOp,
    /// Remote revision the edit was based on (0 for never-synced events)
    pub base_revision: u64,
    pub payload: Event,
    pub state: ChangeState,
    /// Local mutation counter; changes whenever the payload is replaced
    pub sequence: u64,
    /// Delivery attempts that ended in a requeue
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingChange {
    pub fn is_delete(&self) -> bool {
        self.op == ChangeOp::Delete
    }
}

/// A conflict loser kept for recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub event_id: EventId,
    pub losing_payload: Event,
    /// Revision of the payload that won
    pub winning_revision: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Result of importing one external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcome {
    /// New event created
    Inserted,
    /// Existing imported copy refreshed from the external calendar
    Updated,
    /// Re-import of identical data
    Unchanged,
    /// A user-authored or deleted record exists for this id and wins
    Shadowed,
}
