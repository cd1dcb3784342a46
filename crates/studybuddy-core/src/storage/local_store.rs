//! Owner-partitioned local event store.
//!
//! Every owner gets its own [`Partition`] behind its own `RwLock`, so reads
//! and writes for different owners never contend. The outer map is only
//! write-locked the first time an owner is seen.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::database::Database;
use super::partition::{Partition, Touched};
use super::pending::{AuditEntry, ImportOutcome, PendingChange};
use crate::error::{Result, ValidationError};
use crate::event::{Event, EventId};

/// Options for [`LocalStore::delete`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Tombstone ids this device has never seen instead of returning `NotFound`
    pub allow_unknown: bool,
}

/// Local source of truth for events, pending changes and sync bookkeeping.
pub struct LocalStore {
    partitions: RwLock<HashMap<String, Arc<RwLock<Partition>>>>,
    db: Option<Mutex<Database>>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalStore {
    /// A store without persistence.
    pub fn in_memory() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            db: None,
        }
    }

    /// Open (or create) the SQLite-backed store at `path` and load every owner.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened, migrated or read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_database(Database::open(path)?)
    }

    /// Open the store in the default data directory.
    pub fn open_default() -> Result<Self> {
        Self::with_database(Database::open_default()?)
    }

    fn with_database(db: Database) -> Result<Self> {
        let partitions = db
            .load_partitions()?
            .into_iter()
            .map(|p| (p.owner_id().to_string(), Arc::new(RwLock::new(p))))
            .collect::<HashMap<_, _>>();
        tracing::debug!(owners = partitions.len(), "loaded local store");
        Ok(Self {
            partitions: RwLock::new(partitions),
            db: Some(Mutex::new(db)),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Owners with any stored state.
    pub fn owners(&self) -> Vec<String> {
        let map = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        let mut owners: Vec<String> = map.keys().cloned().collect();
        owners.sort();
        owners
    }

    fn partition(&self, owner_id: &str) -> Arc<RwLock<Partition>> {
        {
            let map = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(partition) = map.get(owner_id) {
                return Arc::clone(partition);
            }
        }
        let mut map = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(owner_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Partition::new(owner_id)))),
        )
    }

    fn read<T>(&self, owner_id: &str, f: impl FnOnce(&Partition) -> T) -> T {
        let partition = self.partition(owner_id);
        let guard = partition.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(
        &self,
        owner_id: &str,
        f: impl FnOnce(&mut Partition, &mut Touched) -> Result<T>,
    ) -> Result<T> {
        let partition = self.partition(owner_id);
        let mut guard = partition.write().unwrap_or_else(PoisonError::into_inner);
        let Some(db) = &self.db else {
            return f(&mut guard, &mut Touched::default());
        };

        // Memory only changes once the rows are on disk.
        let snapshot = guard.clone();
        let mut touched = Touched::default();
        let result = f(&mut guard, &mut touched);
        if !touched.is_empty() {
            // SQLite takes one writer at a time; the partition lock keeps
            // each owner's rows in mutation order.
            let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = db.write_through(&guard, &touched) {
                tracing::warn!(owner = owner_id, error = %err, "write-through failed; change rolled back");
                *guard = snapshot;
                return Err(err.into());
            }
        }
        result
    }

    // === Reads ===

    pub fn get(&self, owner_id: &str, id: &EventId) -> Option<Event> {
        self.read(owner_id, |p| p.get(id).cloned())
    }

    /// Non-deleted events overlapping `[start, end)`, ordered by start then id.
    pub fn query(&self, owner_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Event>> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end }.into());
        }
        Ok(self.read(owner_id, |p| p.query(start, end)))
    }

    pub fn live_events(&self, owner_id: &str) -> Vec<Event> {
        self.read(owner_id, Partition::live_events)
    }

    /// Every cached event, tombstones included.
    pub fn all_events(&self, owner_id: &str) -> Vec<Event> {
        self.read(owner_id, Partition::all_events)
    }

    pub fn pending_changes(&self, owner_id: &str) -> Vec<PendingChange> {
        self.read(owner_id, Partition::pending_changes)
    }

    pub fn pending(&self, owner_id: &str, id: &EventId) -> Option<PendingChange> {
        self.read(owner_id, |p| p.pending_snapshot(id))
    }

    pub fn is_pending(&self, owner_id: &str, id: &EventId) -> bool {
        self.read(owner_id, |p| p.is_pending(id))
    }

    pub fn remote_base(&self, owner_id: &str, id: &EventId) -> Option<Event> {
        self.read(owner_id, |p| p.remote_base(id).cloned())
    }

    pub fn has_remote_revision(&self, owner_id: &str, id: &EventId, revision: u64) -> bool {
        self.read(owner_id, |p| p.has_remote_revision(id, revision))
    }

    pub fn audit_log(&self, owner_id: &str) -> Vec<AuditEntry> {
        self.read(owner_id, |p| p.audit_log().to_vec())
    }

    pub fn watermark(&self, owner_id: &str) -> u64 {
        self.read(owner_id, Partition::watermark)
    }

    // === Local mutations ===

    /// Create or replace an event and queue it for sync.
    ///
    /// Returns the stored copy, which carries the bumped revision.
    pub fn upsert(&self, event: Event) -> Result<Event> {
        let owner = event.owner_id.clone();
        let id = event.id;
        self.write(&owner, |p, touched| {
            p.upsert(event, touched)?;
            Ok(p.get(&id).cloned())
        })
        .and_then(|stored| stored.ok_or(crate::error::CoreError::NotFound { owner, id }))
    }

    /// Replace an existing, non-deleted event.
    pub fn update(&self, event: Event) -> Result<Event> {
        let owner = event.owner_id.clone();
        let id = event.id;
        self.write(&owner, |p, touched| {
            p.update(event, touched)?;
            Ok(p.get(&id).cloned())
        })
        .and_then(|stored| stored.ok_or(crate::error::CoreError::NotFound { owner, id }))
    }

    /// Tombstone an event; it is purged once the remote store confirms.
    pub fn delete(&self, owner_id: &str, id: EventId, at: DateTime<Utc>, options: DeleteOptions) -> Result<()> {
        self.write(owner_id, |p, touched| p.delete(id, at, options.allow_unknown, touched))
    }

    /// Insert or refresh an externally imported event.
    pub fn import_external(&self, owner_id: &str, event: Event) -> Result<ImportOutcome> {
        self.write(owner_id, |p, touched| p.import_external(event, touched))
    }

    pub fn restore_from_audit(&self, owner_id: &str, audit_id: u64, at: DateTime<Utc>) -> Result<Event> {
        self.write(owner_id, |p, touched| p.restore_from_audit(audit_id, at, touched))
    }

    pub fn release_quarantine(&self, owner_id: &str, id: &EventId) -> Result<()> {
        self.write(owner_id, |p, touched| p.release_quarantine(id, touched))
    }

    // === Reconciliation bookkeeping ===

    pub fn begin_flight(&self, owner_id: &str) -> Result<Vec<PendingChange>> {
        self.write(owner_id, |p, touched| Ok(p.begin_flight(touched)))
    }

    /// Returns false if a newer edit was queued while the write was in flight.
    pub fn commit(&self, owner_id: &str, sequence: u64, committed: Event) -> Result<bool> {
        self.write(owner_id, |p, touched| Ok(p.commit(sequence, committed, touched)))
    }

    pub fn requeue(&self, owner_id: &str, id: &EventId, error: Option<String>) -> Result<()> {
        self.write(owner_id, |p, touched| {
            p.requeue(id, error, touched);
            Ok(())
        })
    }

    pub fn quarantine(&self, owner_id: &str, id: &EventId, error: String) -> Result<()> {
        self.write(owner_id, |p, touched| {
            p.quarantine(id, error, touched);
            Ok(())
        })
    }

    pub fn discard_pending(&self, owner_id: &str, id: &EventId, sequence: u64) -> Result<bool> {
        self.write(owner_id, |p, touched| Ok(p.discard_pending(id, sequence, touched)))
    }

    pub fn apply_remote(&self, owner_id: &str, remote: Event) -> Result<()> {
        self.write(owner_id, |p, touched| {
            p.apply_remote(remote, touched);
            Ok(())
        })
    }

    pub fn record_remote_base(&self, owner_id: &str, remote: Event) -> Result<()> {
        self.write(owner_id, |p, touched| {
            p.record_remote_base(remote, touched);
            Ok(())
        })
    }

    pub fn record_audit(
        &self,
        owner_id: &str,
        losing_payload: Event,
        winning_revision: u64,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry> {
        self.write(owner_id, |p, touched| {
            Ok(p.record_audit(losing_payload, winning_revision, at, touched))
        })
    }

    pub fn set_watermark(&self, owner_id: &str, watermark: u64) -> Result<()> {
        self.write(owner_id, |p, touched| {
            p.set_watermark(watermark, touched);
            Ok(())
        })
    }
}
