//! Tests for conflict_resolver module.

#[cfg(test)]
mod tests {
    use super::super::conflict_resolver::*;
    use crate::event::{Event, EventCategory, EventSource};
    use crate::storage::{ChangeOp, ChangeState, PendingChange};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn base() -> Event {
        Event::new("alice", "Linear algebra", at(9, 0), at(10, 0), EventCategory::StudySession, at(7, 0))
            .with_revision(3)
    }

    fn pending(op: ChangeOp, payload: Event) -> PendingChange {
        PendingChange {
            event_id: payload.id,
            op,
            base_revision: 3,
            payload,
            state: ChangeState::InFlight,
            sequence: 1,
            attempts: 0,
            last_error: None,
        }
    }

    fn tombstone(mut event: Event, when: DateTime<Utc>) -> Event {
        event.deleted = true;
        event.last_modified = when;
        event
    }

    #[test]
    fn test_identical_payload_means_already_applied() {
        let local = base();
        let remote = local.clone().with_revision(4).with_source(EventSource::Remote);
        let decision = resolve_conflict(&pending(ChangeOp::Upsert, local), &remote, None);
        assert_eq!(decision, Resolution::AlreadyApplied);
    }

    #[test]
    fn test_later_remote_upsert_wins_over_local_upsert() {
        let mut local = base();
        local.title = "LA revision".to_string();
        local.last_modified = at(8, 0);

        let mut remote = base().with_revision(5);
        remote.title = "LA problem set".to_string();
        remote.last_modified = at(8, 30);

        let decision = resolve_conflict(&pending(ChangeOp::Upsert, local), &remote, Some(&base()));
        assert_eq!(decision, Resolution::RemoteWins);
        assert!(decision.local_lost());
    }

    #[test]
    fn test_disjoint_edits_are_merged() {
        let mut local = base();
        local.title = "Eigenvalues".to_string();
        local.last_modified = at(8, 0);

        let mut remote = base().with_revision(5);
        remote.end = at(10, 30);
        remote.last_modified = at(8, 30);

        match resolve_conflict(&pending(ChangeOp::Upsert, local), &remote, Some(&base())) {
            Resolution::Merged(merged) => {
                assert_eq!(merged.title, "Eigenvalues");
                assert_eq!(merged.end, at(10, 30));
                assert_eq!(merged.last_modified, at(8, 30));
            }
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn test_without_base_falls_back_to_last_write() {
        let mut local = base();
        local.title = "Eigenvalues".to_string();
        local.last_modified = at(9, 0);

        let mut remote = base().with_revision(5);
        remote.end = at(10, 30);
        remote.last_modified = at(8, 30);

        let decision = resolve_conflict(&pending(ChangeOp::Upsert, local), &remote, None);
        assert_eq!(decision, Resolution::LocalWins);
    }

    #[test]
    fn test_delete_versus_upsert_by_timestamp() {
        let deleted_at = at(8, 0);
        let local_delete = pending(ChangeOp::Delete, tombstone(base(), deleted_at));

        let mut later = base().with_revision(5);
        later.last_modified = deleted_at + Duration::seconds(1);
        assert_eq!(resolve_conflict(&local_delete, &later, None), Resolution::RemoteWins);

        let mut same_time = base().with_revision(5);
        same_time.title = "Edited".to_string();
        same_time.last_modified = deleted_at;
        assert_eq!(resolve_conflict(&local_delete, &same_time, None), Resolution::LocalWins);
    }

    #[test]
    fn test_local_upsert_versus_remote_delete() {
        let remote = tombstone(base().with_revision(5), at(8, 0));

        let mut newer = base();
        newer.last_modified = at(8, 1);
        assert_eq!(
            resolve_conflict(&pending(ChangeOp::Upsert, newer), &remote, None),
            Resolution::LocalWins
        );

        let mut equal = base();
        equal.title = "Tie".to_string();
        equal.last_modified = at(8, 0);
        assert_eq!(
            resolve_conflict(&pending(ChangeOp::Upsert, equal), &remote, None),
            Resolution::RemoteWins
        );
    }

    #[test]
    fn test_delete_versus_delete_is_confirmed_by_remote() {
        let local = pending(ChangeOp::Delete, tombstone(base(), at(8, 0)));
        let remote = tombstone(base().with_revision(5), at(8, 5));
        assert_eq!(resolve_conflict(&local, &remote, None), Resolution::RemoteWins);
    }

    #[test]
    fn test_imported_loses_regardless_of_timestamp() {
        let mut local = base().with_source(EventSource::Imported);
        local.last_modified = at(9, 0);
        local.title = "Imported lecture".to_string();

        let mut remote = base().with_revision(5);
        remote.last_modified = at(7, 30);
        remote.title = "Lecture (moved)".to_string();

        assert_eq!(
            resolve_conflict(&pending(ChangeOp::Upsert, local), &remote, Some(&base())),
            Resolution::RemoteWins
        );
    }

    #[test]
    fn test_imported_upsert_never_revives_remote_tombstone() {
        let mut local = base().with_source(EventSource::Imported);
        local.last_modified = at(12, 0);
        let remote = tombstone(base().with_revision(6), at(8, 0));

        let decision = resolve_conflict(&pending(ChangeOp::Upsert, local.clone()), &remote, Some(&base()));
        assert_eq!(decision, Resolution::RemoteWins);

        // A user-authored upsert stamped just as late still wins.
        let user = local.with_source(EventSource::Local);
        let decision = resolve_conflict(&pending(ChangeOp::Upsert, user), &remote, Some(&base()));
        assert_eq!(decision, Resolution::LocalWins);
    }

    #[test]
    fn test_tie_break_is_deterministic_and_antisymmetric() {
        let mut a = base();
        a.title = "Alpha".to_string();
        let mut b = base().with_revision(5);
        b.title = "Beta".to_string();

        let ab = tie_break(&a, &b);
        let ba = tie_break(&b, &a);
        assert_eq!(ab, Resolution::RemoteWins);
        assert_eq!(ba, Resolution::LocalWins);
        assert_eq!(tie_break(&a, &b), ab);
    }
}
