//! Remote per-owner document store.
//!
//! The engine only talks to the remote store through [`RemoteAdapter`].
//! Conditional writes (`put_if_unchanged`, `mark_deleted`) are the one
//! cross-device synchronisation primitive: a write lands only if the stored
//! revision still equals the revision the caller last saw.

mod memory;

pub use memory::{Fault, MemoryRemote};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::{Event, EventId};

/// Failure reported by a [`RemoteAdapter`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The document moved past the expected revision
    #[error("revision conflict")]
    RevisionConflict { current: Option<Event> },

    /// Network or service failure; retryable
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote rejected the payload; retrying the same payload will not help
    #[error("remote rejected payload: {0}")]
    Malformed(String),
}

/// Transport to the remote document store.
///
/// Revisions are assigned by the remote, increase monotonically per owner,
/// and are never reused.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Every document (tombstones included) with a revision above `watermark`,
    /// ordered by revision.
    async fn fetch_since(&self, owner_id: &str, watermark: u64) -> Result<Vec<Event>, RemoteError>;

    /// Write `event` if the stored revision equals `expected_revision`
    /// (0 meaning "does not exist yet"). Returns the newly assigned revision.
    async fn put_if_unchanged(&self, event: &Event, expected_revision: u64) -> Result<u64, RemoteError>;

    /// Tombstone `id` under the same conditional rule as `put_if_unchanged`.
    async fn mark_deleted(
        &self,
        owner_id: &str,
        id: &EventId,
        expected_revision: u64,
        at: DateTime<Utc>,
    ) -> Result<u64, RemoteError>;
}
