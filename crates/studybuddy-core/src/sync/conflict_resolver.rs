//! Conflict resolution between a pending local change and the remote copy.
//!
//! Decisions use only the two payloads and the stored remote base, so every
//! device reaches the same verdict for the same pair.

use std::cmp::Ordering;

use serde::Serialize;

use crate::event::{changed_fields, merge, Event};
use crate::storage::{ChangeOp, PendingChange};

/// Verdict for one conflicting id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum Resolution {
    /// The remote copy already is the local payload (a retried write landed)
    AlreadyApplied,
    LocalWins,
    RemoteWins,
    /// Both sides touched disjoint fields; the merged event wins
    Merged(Event),
}

impl Resolution {
    /// Whether the local payload was overruled and belongs in the audit log.
    pub fn local_lost(&self) -> bool {
        matches!(self, Resolution::RemoteWins)
    }
}

/// Resolve a pending change against the remote copy of the same id.
///
/// `base` is the last remote copy this device saw, used to tell which fields
/// each side touched.
pub fn resolve_conflict(local: &PendingChange, remote: &Event, base: Option<&Event>) -> Resolution {
    let payload = &local.payload;
    if payload.same_content(remote) {
        return Resolution::AlreadyApplied;
    }

    match (local.op, remote.deleted) {
        // Both sides deleted; the remote tombstone confirms ours
        (ChangeOp::Delete, true) => Resolution::RemoteWins,
        (ChangeOp::Delete, false) => {
            if remote.last_modified > payload.last_modified {
                Resolution::RemoteWins
            } else {
                Resolution::LocalWins
            }
        }
        // A remote tombstone is a user decision; imported data cannot undo it
        (ChangeOp::Upsert, true) if !payload.source.is_user_authored() => Resolution::RemoteWins,
        (ChangeOp::Upsert, true) => {
            if payload.last_modified > remote.last_modified {
                Resolution::LocalWins
            } else {
                Resolution::RemoteWins
            }
        }
        (ChangeOp::Upsert, false) => resolve_upserts(payload, remote, base),
    }
}

fn resolve_upserts(local: &Event, remote: &Event, base: Option<&Event>) -> Resolution {
    // Imported data never beats a user-authored copy
    match (local.source.is_user_authored(), remote.source.is_user_authored()) {
        (false, true) => return Resolution::RemoteWins,
        (true, false) => return Resolution::LocalWins,
        _ => {}
    }

    if let Some(base) = base.filter(|b| !b.deleted) {
        let local_touched = changed_fields(base, local);
        let remote_touched = changed_fields(base, remote);
        if local_touched.is_empty() {
            return Resolution::RemoteWins;
        }
        if remote_touched.is_empty() {
            return Resolution::LocalWins;
        }
        if local_touched.is_disjoint(&remote_touched) {
            return Resolution::Merged(merge(local, remote, &local_touched));
        }
    }

    match local.last_modified.cmp(&remote.last_modified) {
        Ordering::Greater => Resolution::LocalWins,
        Ordering::Less => Resolution::RemoteWins,
        Ordering::Equal => tie_break(local, remote),
    }
}

/// Deterministic winner for two payloads stamped at the same instant:
/// the greater content key wins.
pub fn tie_break(local: &Event, remote: &Event) -> Resolution {
    match local.cmp_content(remote) {
        Ordering::Greater => Resolution::LocalWins,
        Ordering::Less => Resolution::RemoteWins,
        Ordering::Equal => Resolution::AlreadyApplied,
    }
}
