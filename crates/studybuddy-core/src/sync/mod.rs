//! Reconciliation between the local store and the remote document store.
//!
//! Pending local changes are pushed with conditional writes, remote changes
//! above the owner's watermark are pulled, and diverged copies are settled
//! by the deterministic policy in [`conflict_resolver`].

pub mod conflict_resolver;
pub mod flight;
pub mod sync_engine;
pub mod types;

#[cfg(test)]
mod conflict_resolver_tests;

pub use conflict_resolver::{resolve_conflict, tie_break, Resolution};
pub use flight::{CancelHandle, FlightRegistry};
pub use sync_engine::Reconciler;
pub use types::{ConflictRecord, RejectedEvent, SyncError, SyncReport};
