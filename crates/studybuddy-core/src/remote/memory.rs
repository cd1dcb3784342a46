//! In-process document store with fault injection.
//!
//! Revisions are dense per owner: every successful write takes the next
//! integer. The whole store serialises to JSON so several CLI invocations
//! (simulated devices) can share one file.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RemoteAdapter, RemoteError};
use crate::error::Result;
use crate::event::{Event, EventCategory, EventId, EventSource};

/// A failure to inject into the next remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Transport,
    Malformed,
    /// Stall before serving the call normally
    Delay(Duration),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct OwnerDocuments {
    revision: u64,
    documents: BTreeMap<EventId, Event>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteState {
    owners: BTreeMap<String, OwnerDocuments>,
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
    faults: Mutex<VecDeque<Fault>>,
    rejected: Mutex<BTreeSet<EventId>>,
    writes: AtomicU64,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; a missing file gives an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let state = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RemoteState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            state: Mutex::new(state),
            ..Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*state)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Queue a fault; each remote call consumes at most one.
    pub fn push_fault(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(fault);
    }

    /// Reject every write of `id` as malformed.
    pub fn reject_writes_for(&self, id: EventId) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    pub fn accept_writes_for(&self, id: &EventId) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Successful conditional writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Latest revision assigned for `owner_id`.
    pub fn revision(&self, owner_id: &str) -> u64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.owners.get(owner_id).map_or(0, |o| o.revision)
    }

    pub fn get(&self, owner_id: &str, id: &EventId) -> Option<Event> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.owners.get(owner_id)?.documents.get(id).cloned()
    }

    /// Non-deleted documents for `owner_id`, ordered by id.
    pub fn live_documents(&self, owner_id: &str) -> Vec<Event> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .owners
            .get(owner_id)
            .map(|o| o.documents.values().filter(|e| !e.deleted).cloned().collect())
            .unwrap_or_default()
    }

    /// Store `event` unconditionally under the next revision, bypassing
    /// validation. Stands in for a misbehaving writer.
    pub fn insert_raw(&self, event: Event) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let owner = state.owners.entry(event.owner_id.clone()).or_default();
        owner.revision += 1;
        let revision = owner.revision;
        owner.documents.insert(event.id, event.with_revision(revision));
        revision
    }

    async fn take_fault(&self) -> Result<(), RemoteError> {
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match fault {
            None => Ok(()),
            Some(Fault::Transport) => Err(RemoteError::Transport("injected transport failure".to_string())),
            Some(Fault::Malformed) => Err(RemoteError::Malformed("injected rejection".to_string())),
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn check_rejected(&self, id: &EventId) -> Result<(), RemoteError> {
        let rejected = self.rejected.lock().unwrap_or_else(PoisonError::into_inner);
        if rejected.contains(id) {
            return Err(RemoteError::Malformed(format!("payload for {id} rejected")));
        }
        Ok(())
    }

    fn conditional_write(
        &self,
        owner_id: &str,
        id: &EventId,
        expected_revision: u64,
        build: impl FnOnce(Option<&Event>, u64) -> Event,
    ) -> Result<u64, RemoteError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let owner = state.owners.entry(owner_id.to_string()).or_default();

        let current = owner.documents.get(id);
        let current_revision = current.map_or(0, |e| e.revision);
        if current_revision != expected_revision {
            return Err(RemoteError::RevisionConflict {
                current: current.cloned(),
            });
        }

        let revision = owner.revision + 1;
        let document = build(current, revision);
        owner.revision = revision;
        owner.documents.insert(*id, document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(revision)
    }
}

#[async_trait]
impl RemoteAdapter for MemoryRemote {
    async fn fetch_since(&self, owner_id: &str, watermark: u64) -> Result<Vec<Event>, RemoteError> {
        self.take_fault().await?;
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delta: Vec<Event> = state
            .owners
            .get(owner_id)
            .map(|o| {
                o.documents
                    .values()
                    .filter(|e| e.revision > watermark)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        delta.sort_by_key(|e| e.revision);
        Ok(delta)
    }

    async fn put_if_unchanged(&self, event: &Event, expected_revision: u64) -> Result<u64, RemoteError> {
        self.take_fault().await?;
        self.check_rejected(&event.id)?;
        if event.deleted {
            return Err(RemoteError::Malformed("use mark_deleted for tombstones".to_string()));
        }
        event
            .validate()
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        self.conditional_write(&event.owner_id, &event.id, expected_revision, |_, revision| {
            event.clone().with_revision(revision)
        })
    }

    async fn mark_deleted(
        &self,
        owner_id: &str,
        id: &EventId,
        expected_revision: u64,
        at: DateTime<Utc>,
    ) -> Result<u64, RemoteError> {
        self.take_fault().await?;
        self.check_rejected(id)?;

        self.conditional_write(owner_id, id, expected_revision, |current, revision| {
            let mut tombstone = current.cloned().unwrap_or_else(|| Event {
                id: *id,
                owner_id: owner_id.to_string(),
                title: String::new(),
                start: at,
                end: at,
                source: EventSource::Local,
                revision: 0,
                last_modified: at,
                deleted: true,
                category: EventCategory::FixedCommitment,
                external_id: None,
                module_id: None,
            });
            tombstone.deleted = true;
            tombstone.last_modified = at;
            tombstone.revision = revision;
            tombstone
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    fn event(owner: &str) -> Event {
        Event::new(owner, "Seminar", at(9), at(10), EventCategory::FixedCommitment, at(8))
    }

    #[tokio::test]
    async fn test_revisions_are_dense_per_owner() {
        let remote = MemoryRemote::new();
        let a = event("alice");
        let b = event("alice");
        let c = event("bob");

        assert_eq!(remote.put_if_unchanged(&a, 0).await.unwrap(), 1);
        assert_eq!(remote.put_if_unchanged(&b, 0).await.unwrap(), 2);
        assert_eq!(remote.put_if_unchanged(&c, 0).await.unwrap(), 1);
        assert_eq!(remote.put_if_unchanged(&a, 1).await.unwrap(), 3);

        let delta = remote.fetch_since("alice", 1).await.unwrap();
        assert_eq!(delta.iter().map(|e| e.revision).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_stale_write_reports_current_document() {
        let remote = MemoryRemote::new();
        let a = event("alice");
        remote.put_if_unchanged(&a, 0).await.unwrap();

        match remote.put_if_unchanged(&a, 0).await {
            Err(RemoteError::RevisionConflict { current: Some(current) }) => {
                assert_eq!(current.revision, 1)
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(remote.write_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_deleted_tombstones_document() {
        let remote = MemoryRemote::new();
        let a = event("alice");
        remote.put_if_unchanged(&a, 0).await.unwrap();

        let revision = remote.mark_deleted("alice", &a.id, 1, at(11)).await.unwrap();
        let stored = remote.get("alice", &a.id).unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.revision, revision);
        assert!(remote.live_documents("alice").is_empty());
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let remote = MemoryRemote::new();
        remote.push_fault(Fault::Transport);
        remote.push_fault(Fault::Malformed);

        assert!(matches!(remote.fetch_since("alice", 0).await, Err(RemoteError::Transport(_))));
        assert!(matches!(
            remote.put_if_unchanged(&event("alice"), 0).await,
            Err(RemoteError::Malformed(_))
        ));
        assert!(remote.fetch_since("alice", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let remote = MemoryRemote::new();
        let mut bad = event("alice");
        bad.end = bad.start;
        assert!(matches!(
            remote.put_if_unchanged(&bad, 0).await,
            Err(RemoteError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");

        let remote = MemoryRemote::new();
        let a = event("alice");
        remote.put_if_unchanged(&a, 0).await.unwrap();
        remote.save(&path).unwrap();

        let loaded = MemoryRemote::load(&path).unwrap();
        assert_eq!(loaded.revision("alice"), 1);
        assert_eq!(loaded.get("alice", &a.id).unwrap().title, "Seminar");
        assert_eq!(MemoryRemote::load(&dir.path().join("missing.json")).unwrap().revision("alice"), 0);
    }
}
