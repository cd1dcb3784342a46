//! Reconciliation engine.
//!
//! One cycle for one owner:
//! 1. Fetch remote documents above the owner's watermark; reject malformed ones.
//! 2. Push every deliverable pending change with a conditional write, settling
//!    conflicts with [`resolve_conflict`] whenever the remote moved past the
//!    change's base revision.
//! 3. Apply the remaining fetched documents locally.
//! 4. Advance the watermark, but only if nothing failed or was cancelled.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::event::{Event, EventId};
use crate::remote::{RemoteAdapter, RemoteError};
use crate::scheduler::ScheduleWindow;
use crate::storage::{LocalStore, PendingChange, SyncSettings};
use crate::sync::conflict_resolver::{resolve_conflict, Resolution};
use crate::sync::flight::{CancelHandle, FlightRegistry};
use crate::sync::types::{ConflictRecord, RejectedEvent, SyncError, SyncReport};

/// Conflict rounds per change before it is handed back to the next cycle.
const MAX_CONFLICT_ROUNDS: usize = 3;

/// What a single remote call came back with after retries.
#[derive(Debug)]
enum CallOutcome<T> {
    Done(T),
    Conflict(Option<Event>),
    Rejected(String),
    Failed(SyncError),
}

/// How one pending change ended this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Settled,
    Quarantined,
    Requeued,
}

/// Drives reconciliation between a [`LocalStore`] and a [`RemoteAdapter`].
pub struct Reconciler {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteAdapter>,
    settings: SyncSettings,
    flights: FlightRegistry,
}

impl Reconciler {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteAdapter>, settings: SyncSettings) -> Self {
        Self {
            store,
            remote,
            settings,
            flights: FlightRegistry::new(),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Whether a cycle for `owner_id` is running right now.
    pub fn is_syncing(&self, owner_id: &str) -> bool {
        self.flights.is_running(owner_id)
    }

    /// Run one reconciliation cycle for `owner_id`.
    ///
    /// Concurrent calls for the same owner run one after the other. Partial
    /// failures are reported in the returned [`SyncReport`]; only a failed
    /// fetch or a local store failure aborts the cycle with an error.
    #[instrument(skip_all, fields(owner = %owner_id))]
    pub async fn run_cycle(&self, owner_id: &str, cancel: &CancelHandle) -> Result<SyncReport, SyncError> {
        let _flight = self.flights.acquire(owner_id).await;

        let watermark = self.store.watermark(owner_id);
        let mut report = SyncReport::new(owner_id, watermark);
        if cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }

        let fetched = match self
            .call("fetch", || self.remote.fetch_since(owner_id, watermark))
            .await
        {
            CallOutcome::Done(docs) => docs,
            CallOutcome::Failed(err) => {
                warn!(error = %err, "fetch failed; pending changes kept for next cycle");
                return Err(err);
            }
            CallOutcome::Rejected(message) => return Err(SyncError::Malformed(message)),
            CallOutcome::Conflict(_) => {
                return Err(SyncError::Malformed("conflict reported for a read".to_string()))
            }
        };

        let mut max_fetched = watermark;
        let mut remote_docs: BTreeMap<EventId, Event> = BTreeMap::new();
        for doc in fetched {
            max_fetched = max_fetched.max(doc.revision);
            if let Err(reason) = check_remote(owner_id, &doc) {
                warn!(event_id = %doc.id, revision = doc.revision, %reason, "rejected remote document");
                report.rejected.push(RejectedEvent {
                    event_id: doc.id,
                    revision: doc.revision,
                    reason,
                });
                continue;
            }
            match remote_docs.get(&doc.id) {
                Some(seen) if seen.revision >= doc.revision => {}
                _ => {
                    remote_docs.insert(doc.id, doc);
                }
            }
        }

        let mut own_commits = BTreeSet::new();
        let mut complete = true;

        let flight = self.store.begin_flight(owner_id)?;
        let mut changes = flight.into_iter();
        while let Some(change) = changes.next() {
            if cancel.is_cancelled() {
                self.requeue_cancelled(owner_id, std::iter::once(change).chain(changes.by_ref()), &mut report)?;
                report.cancelled = true;
                break;
            }
            let fetched = remote_docs.remove(&change.event_id);
            match self
                .deliver(owner_id, &change, fetched, &mut own_commits, &mut report)
                .await?
            {
                Delivery::Settled => {}
                Delivery::Quarantined => report.quarantined.push(change.event_id),
                Delivery::Requeued => {
                    report.requeued.push(change.event_id);
                    complete = false;
                }
            }
        }

        if !report.cancelled {
            for (id, doc) in remote_docs {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                if self.store.has_remote_revision(owner_id, &id, doc.revision) {
                    continue;
                }
                if self.store.is_pending(owner_id, &id) {
                    debug!(event_id = %id, revision = doc.revision, "remote base updated under pending change");
                    self.store.record_remote_base(owner_id, doc)?;
                    continue;
                }
                debug!(event_id = %id, revision = doc.revision, deleted = doc.deleted, "applying remote document");
                self.store.apply_remote(owner_id, doc)?;
                report.pulled += 1;
            }
        }

        report.complete = complete && !report.cancelled;
        if report.complete {
            let mut next = max_fetched;
            while own_commits.contains(&(next + 1)) {
                next += 1;
            }
            self.store.set_watermark(owner_id, next)?;
            report.watermark_after = next;
        }

        report.window = ScheduleWindow::from_events(&self.store.live_events(owner_id));

        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            conflicts = report.conflicts.len(),
            merged = report.merged,
            requeued = report.requeued.len(),
            quarantined = report.quarantined.len(),
            rejected = report.rejected.len(),
            watermark = report.watermark_after,
            cancelled = report.cancelled,
            "sync cycle finished"
        );
        Ok(report)
    }

    async fn deliver(
        &self,
        owner_id: &str,
        change: &PendingChange,
        fetched: Option<Event>,
        own_commits: &mut BTreeSet<u64>,
        report: &mut SyncReport,
    ) -> Result<Delivery, SyncError> {
        let id = change.event_id;
        let mut expected = change.base_revision;
        let mut payload = change.payload.clone();
        let mut against = fetched;

        for _ in 0..MAX_CONFLICT_ROUNDS {
            if let Some(remote) = against.take() {
                if remote.revision != expected {
                    let base = self.store.remote_base(owner_id, &id);
                    let resolution = resolve_conflict(change, &remote, base.as_ref());
                    debug!(event_id = %id, remote_revision = remote.revision, ?resolution, "conflict resolved");

                    if resolution != Resolution::AlreadyApplied {
                        report.conflicts.push(ConflictRecord {
                            event_id: id,
                            local_op: change.op,
                            local: change.payload.clone(),
                            remote: remote.clone(),
                            resolution: resolution.clone(),
                            detected_at: report.started_at,
                        });
                    }

                    match resolution {
                        Resolution::AlreadyApplied => {
                            self.store.commit(owner_id, change.sequence, remote)?;
                            return Ok(Delivery::Settled);
                        }
                        Resolution::RemoteWins => {
                            // A remote tombstone confirming our own delete loses nothing.
                            if !(change.is_delete() && remote.deleted) {
                                self.store.record_audit(
                                    owner_id,
                                    change.payload.clone(),
                                    remote.revision,
                                    report.started_at,
                                )?;
                            }
                            self.store.discard_pending(owner_id, &id, change.sequence)?;
                            self.store.apply_remote(owner_id, remote)?;
                            report.pulled += 1;
                            return Ok(Delivery::Settled);
                        }
                        Resolution::LocalWins => {
                            self.store.record_remote_base(owner_id, remote.clone())?;
                            expected = remote.revision;
                        }
                        Resolution::Merged(merged) => {
                            self.store.record_remote_base(owner_id, remote.clone())?;
                            report.merged += 1;
                            expected = remote.revision;
                            payload = merged;
                        }
                    }
                }
            }

            let outcome = if change.is_delete() {
                self.call("mark_deleted", || {
                    self.remote
                        .mark_deleted(owner_id, &id, expected, payload.last_modified)
                })
                .await
            } else {
                self.call("put", || self.remote.put_if_unchanged(&payload, expected))
                    .await
            };

            match outcome {
                CallOutcome::Done(revision) => {
                    let committed = payload.clone().with_revision(revision);
                    debug!(event_id = %id, revision, delete = change.is_delete(), "change committed");
                    self.store.commit(owner_id, change.sequence, committed)?;
                    own_commits.insert(revision);
                    report.pushed += 1;
                    return Ok(Delivery::Settled);
                }
                CallOutcome::Conflict(Some(current)) => {
                    debug!(event_id = %id, remote_revision = current.revision, "remote moved during write");
                    against = Some(current);
                }
                CallOutcome::Conflict(None) => {
                    // The document vanished remotely; write it as new.
                    expected = 0;
                }
                CallOutcome::Rejected(message) => {
                    warn!(event_id = %id, %message, "remote rejected change; quarantined");
                    self.store.quarantine(owner_id, &id, message)?;
                    return Ok(Delivery::Quarantined);
                }
                CallOutcome::Failed(err) => {
                    warn!(event_id = %id, error = %err, "change requeued");
                    self.store.requeue(owner_id, &id, Some(err.to_string()))?;
                    return Ok(Delivery::Requeued);
                }
            }
        }

        warn!(event_id = %id, "conflict did not settle; change requeued");
        self.store
            .requeue(owner_id, &id, Some("conflict did not settle".to_string()))?;
        Ok(Delivery::Requeued)
    }

    fn requeue_cancelled(
        &self,
        owner_id: &str,
        changes: impl Iterator<Item = PendingChange>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for change in changes {
            self.store
                .requeue(owner_id, &change.event_id, Some(SyncError::Cancelled.to_string()))?;
            report.requeued.push(change.event_id);
        }
        Ok(())
    }

    /// One remote call bounded by the configured timeout. Transport errors
    /// are retried with exponential backoff; a timeout is not retried.
    async fn call<T, F, Fut>(&self, operation: &'static str, mut f: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0u32;
        loop {
            match tokio::time::timeout(self.settings.remote_timeout(), f()).await {
                Err(_) => {
                    warn!(operation, timeout_ms = self.settings.remote_timeout_ms, "remote call timed out");
                    return CallOutcome::Failed(SyncError::Timeout {
                        operation,
                        after_ms: self.settings.remote_timeout_ms,
                    });
                }
                Ok(Ok(value)) => return CallOutcome::Done(value),
                Ok(Err(RemoteError::RevisionConflict { current })) => return CallOutcome::Conflict(current),
                Ok(Err(RemoteError::Malformed(message))) => return CallOutcome::Rejected(message),
                Ok(Err(RemoteError::Transport(message))) => {
                    if attempt >= self.settings.max_retries {
                        return CallOutcome::Failed(SyncError::Transport(message));
                    }
                    attempt += 1;
                    let delay = self.settings.backoff(attempt);
                    debug!(operation, attempt, delay_ms = delay.as_millis() as u64, error = %message, "retrying remote call");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn check_remote(owner_id: &str, doc: &Event) -> Result<(), String> {
    if doc.owner_id != owner_id {
        return Err(format!("belongs to owner '{}'", doc.owner_id));
    }
    if doc.deleted {
        return Ok(());
    }
    doc.validate().map_err(|e| e.to_string())
}
