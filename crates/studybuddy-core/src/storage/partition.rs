//! One owner's slice of the local store.
//!
//! A partition holds the cached events (tombstones included), the coalesced
//! pending-change queue, the last remote-confirmed copy of every synced event
//! (the "remote base", used for field-level merges), the audit log and the
//! sync watermark. Every mutating method reports what it touched so the
//! owning [`LocalStore`](super::LocalStore) can write it through to disk.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::pending::{AuditEntry, ChangeOp, ChangeState, ImportOutcome, PendingChange};
use crate::error::{CoreError, Result, ValidationError};
use crate::event::{changed_fields, Event, EventCategory, EventId, EventSource};

/// Rows a mutation changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Touched {
    pub events: BTreeSet<EventId>,
    pub pending: BTreeSet<EventId>,
    pub remote_base: BTreeSet<EventId>,
    pub audit: Vec<u64>,
    pub sync_state: bool,
}

impl Touched {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.pending.is_empty()
            && self.remote_base.is_empty()
            && self.audit.is_empty()
            && !self.sync_state
    }
}

#[derive(Debug, Clone)]
pub struct Partition {
    owner_id: String,
    events: BTreeMap<EventId, Event>,
    pending: BTreeMap<EventId, PendingChange>,
    remote_base: BTreeMap<EventId, Event>,
    audit: Vec<AuditEntry>,
    watermark: u64,
    next_sequence: u64,
    next_audit_id: u64,
}

impl Partition {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            events: BTreeMap::new(),
            pending: BTreeMap::new(),
            remote_base: BTreeMap::new(),
            audit: Vec::new(),
            watermark: 0,
            next_sequence: 1,
            next_audit_id: 1,
        }
    }

    /// Rebuild a partition from persisted rows.
    pub(crate) fn from_parts(
        owner_id: String,
        events: Vec<Event>,
        pending: Vec<PendingChange>,
        remote_base: Vec<Event>,
        audit: Vec<AuditEntry>,
        watermark: u64,
    ) -> Self {
        let next_sequence = pending.iter().map(|p| p.sequence).max().unwrap_or(0) + 1;
        let next_audit_id = audit.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        Self {
            owner_id,
            events: events.into_iter().map(|e| (e.id, e)).collect(),
            pending: pending.into_iter().map(|p| (p.event_id, p)).collect(),
            remote_base: remote_base.into_iter().map(|e| (e.id, e)).collect(),
            audit,
            watermark,
            next_sequence,
            next_audit_id,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    // === Reads ===

    /// Cached copy of an event, tombstones included.
    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.get(id)
    }

    /// Non-deleted events overlapping `[start, end)`, ordered by start then id.
    pub fn query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Event> {
        let mut found: Vec<Event> = self
            .events
            .values()
            .filter(|e| !e.deleted && e.intersects(start, end))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        found
    }

    /// Every non-deleted event, ordered by start then id.
    pub fn live_events(&self) -> Vec<Event> {
        let mut found: Vec<Event> = self.events.values().filter(|e| !e.deleted).cloned().collect();
        found.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        found
    }

    /// Every cached event including tombstones, ordered by id.
    pub fn all_events(&self) -> Vec<Event> {
        self.events.values().cloned().collect()
    }

    /// Pending changes ordered by event id.
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.pending.values().cloned().collect()
    }

    /// Whether a local change to `id` has not reached the remote store yet.
    pub fn is_pending(&self, id: &EventId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending(&self, id: &EventId) -> Option<&PendingChange> {
        self.pending.get(id)
    }

    pub fn remote_base(&self, id: &EventId) -> Option<&Event> {
        self.remote_base.get(id)
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// True if the remote copy we hold is at least as new as `revision`.
    pub fn has_remote_revision(&self, id: &EventId, revision: u64) -> bool {
        self.remote_base.get(id).is_some_and(|b| b.revision >= revision)
    }

    pub(crate) fn pending_snapshot(&self, id: &EventId) -> Option<PendingChange> {
        self.pending.get(id).cloned()
    }

    pub(crate) fn audit_entry(&self, audit_id: u64) -> Option<&AuditEntry> {
        self.audit.iter().find(|a| a.id == audit_id)
    }

    // === Local mutations ===

    /// Create or replace an event as a user edit.
    pub(crate) fn upsert(&mut self, mut event: Event, touched: &mut Touched) -> Result<()> {
        self.check_owner(&event)?;
        event.validate()?;
        event.source = EventSource::Local;
        self.stage_upsert(event, touched);
        Ok(())
    }

    /// Replace an existing, non-deleted event.
    pub(crate) fn update(&mut self, event: Event, touched: &mut Touched) -> Result<()> {
        match self.events.get(&event.id) {
            Some(current) if !current.deleted => self.upsert(event, touched),
            _ => Err(CoreError::NotFound {
                owner: self.owner_id.clone(),
                id: event.id,
            }),
        }
    }

    /// Tombstone an event and queue its remote deletion.
    pub(crate) fn delete(
        &mut self,
        id: EventId,
        at: DateTime<Utc>,
        allow_unknown: bool,
        touched: &mut Touched,
    ) -> Result<()> {
        let current = match self.events.get(&id) {
            Some(current) => current.clone(),
            None if allow_unknown => self.skeleton(id, at),
            None => {
                return Err(CoreError::NotFound {
                    owner: self.owner_id.clone(),
                    id,
                })
            }
        };

        if let Some(pending) = self.pending.get(&id) {
            match pending.op {
                ChangeOp::Delete if current.deleted => return Ok(()),
                ChangeOp::Upsert if pending.payload.last_modified > at => {
                    tracing::debug!(
                        owner = %self.owner_id,
                        event_id = %id,
                        "delete ignored: pending upsert is newer"
                    );
                    return Ok(());
                }
                _ => {}
            }
        }

        let mut tombstone = current;
        tombstone.deleted = true;
        tombstone.last_modified = at;
        tombstone.source = EventSource::Local;
        tombstone.revision += 1;

        self.queue(ChangeOp::Delete, tombstone.clone(), touched);
        self.events.insert(id, tombstone);
        touched.events.insert(id);
        Ok(())
    }

    /// Insert or refresh an externally imported event, idempotent by external id.
    pub(crate) fn import_external(
        &mut self,
        mut event: Event,
        touched: &mut Touched,
    ) -> Result<ImportOutcome> {
        self.check_owner(&event)?;
        let external_id = event
            .external_id
            .clone()
            .filter(|ext| !ext.trim().is_empty())
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "external_id".to_string(),
                message: "imported events need an external id".to_string(),
            })?;

        event.id = EventId::from_external(&self.owner_id, &external_id);
        event.source = EventSource::Imported;
        event.revision = 0;
        event.deleted = false;
        event.validate()?;

        // Deletion already confirmed remotely; only the base tombstone is left
        if self.remote_base.get(&event.id).is_some_and(|b| b.deleted) && !self.events.contains_key(&event.id) {
            return Ok(ImportOutcome::Shadowed);
        }

        let outcome = match self.events.get(&event.id) {
            Some(current) if current.deleted || current.source.is_user_authored() => {
                return Ok(ImportOutcome::Shadowed)
            }
            Some(current) if changed_fields(current, &event).is_empty() => {
                return Ok(ImportOutcome::Unchanged)
            }
            Some(_) => ImportOutcome::Updated,
            None => ImportOutcome::Inserted,
        };

        self.stage_upsert(event, touched);
        Ok(outcome)
    }

    fn stage_upsert(&mut self, mut event: Event, touched: &mut Touched) {
        let id = event.id;
        let existing = self.events.get(&id);

        if let (Some(current), Some(pending)) = (existing, self.pending.get(&id)) {
            // A queued deletion only yields to a strictly later edit.
            if current.deleted
                && pending.op == ChangeOp::Delete
                && event.last_modified <= current.last_modified
            {
                tracing::debug!(
                    owner = %self.owner_id,
                    event_id = %id,
                    "upsert ignored: pending delete is newer or equal"
                );
                return;
            }
        }

        event.revision = existing.map_or(event.revision, |e| e.revision.max(event.revision)) + 1;
        event.deleted = false;

        self.queue(ChangeOp::Upsert, event.clone(), touched);
        self.events.insert(id, event);
        touched.events.insert(id);
    }

    fn queue(&mut self, op: ChangeOp, payload: Event, touched: &mut Touched) {
        let id = payload.id;
        let base_revision = self.base_revision_for(&id);
        let state = match self.pending.get(&id).map(|p| p.state) {
            Some(ChangeState::InFlight) => ChangeState::InFlight,
            _ => ChangeState::Pending,
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.pending.insert(
            id,
            PendingChange {
                event_id: id,
                op,
                base_revision,
                payload,
                state,
                sequence,
                attempts: 0,
                last_error: None,
            },
        );
        touched.pending.insert(id);
    }

    fn base_revision_for(&self, id: &EventId) -> u64 {
        if let Some(pending) = self.pending.get(id) {
            return pending.base_revision;
        }
        self.remote_base.get(id).map_or(0, |b| b.revision)
    }

    fn skeleton(&self, id: EventId, at: DateTime<Utc>) -> Event {
        Event {
            id,
            owner_id: self.owner_id.clone(),
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
        }
    }

    fn check_owner(&self, event: &Event) -> Result<()> {
        if event.owner_id != self.owner_id {
            return Err(ValidationError::InvalidValue {
                field: "owner_id".to_string(),
                message: format!(
                    "event belongs to '{}', not '{}'",
                    event.owner_id, self.owner_id
                ),
            }
            .into());
        }
        Ok(())
    }

    // === Reconciliation bookkeeping ===

    /// Move every deliverable change to `InFlight` and return them.
    ///
    /// Only the reconciler for this owner calls this, under its single-flight
    /// token, so an `InFlight` change found here is left over from an
    /// interrupted process and is delivered again.
    pub(crate) fn begin_flight(&mut self, touched: &mut Touched) -> Vec<PendingChange> {
        let mut flight = Vec::new();
        for change in self.pending.values_mut() {
            if !change.state.is_deliverable() {
                continue;
            }
            change.state = ChangeState::InFlight;
            touched.pending.insert(change.event_id);
            flight.push(change.clone());
        }
        flight
    }

    /// Record a successful remote write of the change sent with `sequence`.
    ///
    /// Returns false when the user edited the event while the write was in
    /// flight; the newer edit stays queued on top of the committed revision.
    pub(crate) fn commit(&mut self, sequence: u64, committed: Event, touched: &mut Touched) -> bool {
        let id = committed.id;
        let Some(change) = self.pending.get_mut(&id) else {
            return false;
        };
        touched.pending.insert(id);
        touched.remote_base.insert(id);

        if change.sequence != sequence {
            change.base_revision = committed.revision;
            change.state = ChangeState::Pending;
            self.remote_base.insert(id, committed);
            return false;
        }

        self.pending.remove(&id);
        touched.events.insert(id);
        if committed.deleted {
            // Deletion confirmed remotely; the tombstone has done its job.
            self.events.remove(&id);
            self.settle_tombstone(committed);
        } else {
            self.events.insert(id, committed.clone());
            self.remote_base.insert(id, committed);
        }
        true
    }

    /// Hand a change back for the next cycle. Its base revision is kept; a
    /// stale base only costs one more conflict round on the next write.
    pub(crate) fn requeue(&mut self, id: &EventId, error: Option<String>, touched: &mut Touched) {
        if let Some(change) = self.pending.get_mut(id) {
            change.state = ChangeState::Requeued;
            change.attempts += 1;
            change.last_error = error;
            touched.pending.insert(*id);
        }
    }

    pub(crate) fn quarantine(&mut self, id: &EventId, error: String, touched: &mut Touched) {
        if let Some(change) = self.pending.get_mut(id) {
            change.state = ChangeState::Quarantined;
            change.last_error = Some(error);
            touched.pending.insert(*id);
        }
    }

    pub(crate) fn release_quarantine(&mut self, id: &EventId, touched: &mut Touched) -> Result<()> {
        match self.pending.get_mut(id) {
            Some(change) if change.state == ChangeState::Quarantined => {
                change.state = ChangeState::Pending;
                change.attempts = 0;
                touched.pending.insert(*id);
                Ok(())
            }
            _ => Err(CoreError::NotFound {
                owner: self.owner_id.clone(),
                id: *id,
            }),
        }
    }

    /// Drop a conflict-losing change unless a newer edit replaced it.
    pub(crate) fn discard_pending(&mut self, id: &EventId, sequence: u64, touched: &mut Touched) -> bool {
        let Some(change) = self.pending.get_mut(id) else {
            return false;
        };
        touched.pending.insert(*id);
        if change.sequence != sequence {
            change.state = ChangeState::Pending;
            return false;
        }
        self.pending.remove(id);
        true
    }

    /// Apply a remote copy that won (or was never contested).
    ///
    /// With a change still queued for the id only the remote base moves, so
    /// the user's newer or quarantined edit stays visible.
    pub(crate) fn apply_remote(&mut self, remote: Event, touched: &mut Touched) {
        let id = remote.id;
        if self.pending.contains_key(&id) {
            self.remote_base.insert(id, remote);
            touched.remote_base.insert(id);
            return;
        }

        if remote.deleted {
            if self.events.remove(&id).is_some() {
                touched.events.insert(id);
            }
            if self.remote_base.contains_key(&id) || remote.external_id.is_some() {
                touched.remote_base.insert(id);
            }
            self.settle_tombstone(remote);
            return;
        }

        let mut local = remote.clone();
        if local.source != EventSource::Imported {
            local.source = EventSource::Remote;
        }
        self.events.insert(id, local);
        self.remote_base.insert(id, remote);
        touched.events.insert(id);
        touched.remote_base.insert(id);
    }

    /// Drop the base copy of a deleted event. Imported ids keep the remote
    /// tombstone so a later re-import of the same external id stays shadowed.
    fn settle_tombstone(&mut self, tombstone: Event) {
        let id = tombstone.id;
        if tombstone.external_id.is_some() {
            self.remote_base.insert(id, tombstone);
        } else {
            self.remote_base.remove(&id);
        }
    }

    /// Remember the latest remote copy without touching the cached event.
    pub(crate) fn record_remote_base(&mut self, remote: Event, touched: &mut Touched) {
        let id = remote.id;
        self.remote_base.insert(id, remote);
        touched.remote_base.insert(id);
    }

    pub(crate) fn record_audit(
        &mut self,
        losing_payload: Event,
        winning_revision: u64,
        recorded_at: DateTime<Utc>,
        touched: &mut Touched,
    ) -> AuditEntry {
        let entry = AuditEntry {
            id: self.next_audit_id,
            event_id: losing_payload.id,
            losing_payload,
            winning_revision,
            recorded_at,
        };
        self.next_audit_id += 1;
        self.audit.push(entry.clone());
        touched.audit.push(entry.id);
        entry
    }

    /// Re-apply a conflict loser as a fresh local edit made at `at`.
    pub(crate) fn restore_from_audit(
        &mut self,
        audit_id: u64,
        at: DateTime<Utc>,
        touched: &mut Touched,
    ) -> Result<Event> {
        let entry = self
            .audit_entry(audit_id)
            .cloned()
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "audit_id".to_string(),
                message: format!("no audit entry {audit_id} for owner '{}'", self.owner_id),
            })?;

        let id = entry.event_id;
        if entry.losing_payload.deleted {
            self.delete(id, at, true, touched)?;
        } else {
            let mut payload = entry.losing_payload;
            payload.last_modified = at;
            self.upsert(payload, touched)?;
        }
        self.events.get(&id).cloned().ok_or(CoreError::NotFound {
            owner: self.owner_id.clone(),
            id,
        })
    }

    pub(crate) fn set_watermark(&mut self, watermark: u64, touched: &mut Touched) {
        if watermark != self.watermark {
            self.watermark = watermark;
            touched.sync_state = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const OWNER: &str = "owner-1";

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn session(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new(OWNER, title, start, end, EventCategory::StudySession, at(7, 0))
    }

    #[test]
    fn test_upsert_bumps_revision_and_queues_change() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let event = session("Read ch. 3", at(9, 0), at(10, 0));
        let id = event.id;

        p.upsert(event.clone(), &mut touched).unwrap();
        assert_eq!(p.get(&id).unwrap().revision, 1);

        p.upsert(event, &mut touched).unwrap();
        assert_eq!(p.get(&id).unwrap().revision, 2);

        let pending = p.pending_changes();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op, ChangeOp::Upsert);
        assert_eq!(pending[0].base_revision, 0);
        assert!(touched.events.contains(&id));
    }

    #[test]
    fn test_upsert_rejects_malformed_payload() {
        let mut p = Partition::new(OWNER);
        let bad = session("Backwards", at(10, 0), at(9, 0));
        let result = p.upsert(bad, &mut Touched::default());
        assert!(matches!(result, Err(CoreError::MalformedPayload { .. })));
        assert!(p.pending_changes().is_empty());
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let mut p = Partition::new(OWNER);
        let event = session("Ghost", at(9, 0), at(10, 0));
        assert!(matches!(
            p.update(event, &mut Touched::default()),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_keeps_tombstone_until_confirmed() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let event = session("Revise", at(9, 0), at(10, 0));
        let id = event.id;
        p.upsert(event, &mut touched).unwrap();

        p.delete(id, at(8, 0), false, &mut touched).unwrap();
        assert!(p.get(&id).unwrap().deleted);
        assert!(p.query(at(0, 0), at(23, 0)).is_empty());
        assert_eq!(p.pending(&id).unwrap().op, ChangeOp::Delete);
    }

    #[test]
    fn test_delete_unknown_requires_opt_in() {
        let mut p = Partition::new(OWNER);
        let id = EventId::new();
        assert!(p.delete(id, at(8, 0), false, &mut Touched::default()).is_err());

        p.delete(id, at(8, 0), true, &mut Touched::default()).unwrap();
        assert!(p.get(&id).unwrap().deleted);
        assert!(p.pending(&id).unwrap().is_delete());
    }

    #[test]
    fn test_reupsert_after_delete_resolves_by_timestamp() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let mut event = session("Essay", at(9, 0), at(10, 0));
        event.last_modified = at(7, 0);
        let id = event.id;
        p.upsert(event.clone(), &mut touched).unwrap();

        // Delete stamped 08:00, then an upsert stamped 07:30 arrives later.
        p.delete(id, at(8, 0), false, &mut touched).unwrap();
        let mut stale = event.clone();
        stale.last_modified = at(7, 30);
        p.upsert(stale, &mut touched).unwrap();
        assert!(p.get(&id).unwrap().deleted, "older upsert must not resurrect");

        let mut fresh = event;
        fresh.last_modified = at(8, 30);
        p.upsert(fresh, &mut touched).unwrap();
        assert!(!p.get(&id).unwrap().deleted, "strictly later upsert wins");
        assert_eq!(p.pending(&id).unwrap().op, ChangeOp::Upsert);
    }

    #[test]
    fn test_delete_older_than_pending_upsert_is_ignored() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let mut event = session("Lab prep", at(9, 0), at(10, 0));
        event.last_modified = at(8, 0);
        let id = event.id;
        p.upsert(event, &mut touched).unwrap();

        p.delete(id, at(7, 0), false, &mut touched).unwrap();
        assert!(!p.get(&id).unwrap().deleted);
    }

    #[test]
    fn test_query_orders_by_start_then_id() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let a = session("A", at(11, 0), at(12, 0));
        let b = session("B", at(9, 0), at(10, 0));
        let c = session("C", at(9, 0), at(9, 30));
        for e in [&a, &b, &c] {
            p.upsert(e.clone(), &mut touched).unwrap();
        }

        let found = p.query(at(8, 0), at(13, 0));
        assert_eq!(found.len(), 3);
        assert_eq!(found[2].id, a.id);
        assert!(found[0].id < found[1].id);

        let narrow = p.query(at(10, 0), at(11, 0));
        assert!(narrow.is_empty(), "half-open range excludes touching events");
    }

    #[test]
    fn test_import_is_idempotent_by_external_id() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let mut external = Event::new(OWNER, "Lecture", at(9, 0), at(10, 0), EventCategory::FixedCommitment, at(6, 0));
        external.external_id = Some("cal-42".to_string());

        assert_eq!(p.import_external(external.clone(), &mut touched).unwrap(), ImportOutcome::Inserted);
        assert_eq!(p.import_external(external.clone(), &mut touched).unwrap(), ImportOutcome::Unchanged);
        assert_eq!(p.live_events().len(), 1);

        external.end = at(10, 30);
        assert_eq!(p.import_external(external, &mut touched).unwrap(), ImportOutcome::Updated);
        assert_eq!(p.live_events()[0].end, at(10, 30));
    }

    #[test]
    fn test_import_never_overrides_user_edit_or_tombstone() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let mut external = Event::new(OWNER, "Lecture", at(9, 0), at(10, 0), EventCategory::FixedCommitment, at(6, 0));
        external.external_id = Some("cal-7".to_string());
        p.import_external(external.clone(), &mut touched).unwrap();

        let id = EventId::from_external(OWNER, "cal-7");
        let mut edited = p.get(&id).unwrap().clone();
        edited.title = "Lecture (room change)".to_string();
        p.upsert(edited, &mut touched).unwrap();

        external.start = at(9, 15);
        assert_eq!(p.import_external(external.clone(), &mut touched).unwrap(), ImportOutcome::Shadowed);

        p.delete(id, at(12, 0), false, &mut touched).unwrap();
        assert_eq!(p.import_external(external, &mut touched).unwrap(), ImportOutcome::Shadowed);
    }

    #[test]
    fn test_commit_clears_change_and_purges_confirmed_tombstone() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let event = session("Flashcards", at(9, 0), at(9, 30));
        let id = event.id;
        p.upsert(event, &mut touched).unwrap();

        let flight = p.begin_flight(&mut touched);
        let committed = flight[0].payload.clone().with_revision(12);
        assert!(p.commit(flight[0].sequence, committed, &mut touched));
        assert!(p.pending(&id).is_none());
        assert_eq!(p.remote_base(&id).unwrap().revision, 12);

        p.delete(id, at(11, 0), false, &mut touched).unwrap();
        let flight = p.begin_flight(&mut touched);
        assert_eq!(flight[0].base_revision, 12);
        let confirmed = flight[0].payload.clone().with_revision(13);
        assert!(p.commit(flight[0].sequence, confirmed, &mut touched));
        assert!(p.get(&id).is_none());
    }

    #[test]
    fn test_confirmed_delete_of_import_keeps_it_shadowed() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let mut external = Event::new(OWNER, "Lecture", at(9, 0), at(10, 0), EventCategory::FixedCommitment, at(6, 0));
        external.external_id = Some("cal-42".to_string());
        p.import_external(external.clone(), &mut touched).unwrap();
        let id = EventId::from_external(OWNER, "cal-42");

        let flight = p.begin_flight(&mut touched);
        assert!(p.commit(flight[0].sequence, flight[0].payload.clone().with_revision(1), &mut touched));

        p.delete(id, at(11, 0), false, &mut touched).unwrap();
        let flight = p.begin_flight(&mut touched);
        assert!(p.commit(flight[0].sequence, flight[0].payload.clone().with_revision(2), &mut touched));
        assert!(p.get(&id).is_none());
        assert!(p.remote_base(&id).unwrap().deleted);

        assert_eq!(p.import_external(external, &mut touched).unwrap(), ImportOutcome::Shadowed);
        assert!(p.pending_changes().is_empty());
    }

    #[test]
    fn test_remote_delete_of_import_keeps_it_shadowed() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let mut external = Event::new(OWNER, "Lecture", at(9, 0), at(10, 0), EventCategory::FixedCommitment, at(6, 0));
        external.external_id = Some("cal-9".to_string());
        let id = EventId::from_external(OWNER, "cal-9");

        let mut tombstone = external.clone().with_id(id).with_revision(4);
        tombstone.deleted = true;
        p.apply_remote(tombstone, &mut touched);
        assert!(touched.remote_base.contains(&id));

        assert_eq!(p.import_external(external, &mut touched).unwrap(), ImportOutcome::Shadowed);
        assert!(p.live_events().is_empty());
    }

    #[test]
    fn test_edit_during_flight_survives_commit() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let event = session("Problem set", at(9, 0), at(10, 0));
        let id = event.id;
        p.upsert(event.clone(), &mut touched).unwrap();

        let flight = p.begin_flight(&mut touched);
        let mut newer = event;
        newer.title = "Problem set 2".to_string();
        newer.last_modified += Duration::minutes(1);
        p.upsert(newer, &mut touched).unwrap();

        let committed = flight[0].payload.clone().with_revision(4);
        assert!(!p.commit(flight[0].sequence, committed, &mut touched));

        let change = p.pending(&id).unwrap();
        assert_eq!(change.base_revision, 4);
        assert_eq!(change.state, ChangeState::Pending);
        assert_eq!(p.get(&id).unwrap().title, "Problem set 2");
    }

    #[test]
    fn test_apply_remote_marks_source_and_removes_deleted() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let remote = session("Group study", at(14, 0), at(15, 0)).with_revision(3);
        let id = remote.id;

        p.apply_remote(remote.clone(), &mut touched);
        assert_eq!(p.get(&id).unwrap().source, EventSource::Remote);
        assert!(p.has_remote_revision(&id, 3));

        let mut gone = remote;
        gone.deleted = true;
        gone.revision = 4;
        p.apply_remote(gone, &mut touched);
        assert!(p.get(&id).is_none());
    }

    #[test]
    fn test_quarantine_and_release() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let event = session("Notes", at(9, 0), at(10, 0));
        let id = event.id;
        p.upsert(event, &mut touched).unwrap();

        p.quarantine(&id, "rejected by remote".to_string(), &mut touched);
        assert!(p.begin_flight(&mut touched).is_empty());

        p.release_quarantine(&id, &mut touched).unwrap();
        assert_eq!(p.begin_flight(&mut touched).len(), 1);
        assert!(p.release_quarantine(&id, &mut touched).is_err());
    }

    #[test]
    fn test_restore_from_audit_requeues_losing_payload() {
        let mut p = Partition::new(OWNER);
        let mut touched = Touched::default();
        let loser = session("My version", at(9, 0), at(10, 0));
        let id = loser.id;
        p.apply_remote(session("Their version", at(9, 0), at(10, 0)).with_id(id).with_revision(5), &mut touched);

        let entry = p.record_audit(loser, 5, at(12, 0), &mut touched);
        let restored = p.restore_from_audit(entry.id, at(12, 5), &mut touched).unwrap();

        assert_eq!(restored.title, "My version");
        assert_eq!(restored.last_modified, at(12, 5));
        assert_eq!(p.pending(&id).unwrap().base_revision, 5);
        assert!(p.restore_from_audit(99, at(12, 5), &mut touched).is_err());
    }
}
