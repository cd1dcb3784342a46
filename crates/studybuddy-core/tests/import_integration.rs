//! Integration tests for calendar import, persistence and sync together.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use studybuddy_core::event::{EventId, EventSource};
use studybuddy_core::import::{import_into, JsonImporter};
use studybuddy_core::remote::MemoryRemote;
use studybuddy_core::storage::{DeleteOptions, LocalStore, SyncSettings};
use studybuddy_core::sync::{CancelHandle, Reconciler};

const OWNER: &str = "owner-1";

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
}

fn write_calendar(dir: &std::path::Path, title: &str) -> std::path::PathBuf {
    let path = dir.join("calendar.json");
    std::fs::write(
        &path,
        format!(
            r#"[{{"external_id": "cal-42", "title": "{title}",
                 "start": "2025-03-10T14:00:00Z", "end": "2025-03-10T15:00:00Z"}}]"#
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_reimport_unchanged_is_noop_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("studybuddy.db");
    let importer = JsonImporter::new(write_calendar(dir.path(), "Guest lecture"));

    {
        let store = LocalStore::open(&db_path).unwrap();
        let summary = import_into(&store, OWNER, &importer, at(0), at(23), at(8)).unwrap();
        assert_eq!(summary.inserted, 1);
    }

    let store = LocalStore::open(&db_path).unwrap();
    let summary = import_into(&store, OWNER, &importer, at(0), at(23), at(9)).unwrap();
    assert_eq!(summary.unchanged, 1);
    assert_eq!(store.live_events(OWNER).len(), 1);
    assert_eq!(store.pending_changes(OWNER).len(), 1);

    let event = &store.live_events(OWNER)[0];
    assert_eq!(event.id, EventId::from_external(OWNER, "cal-42"));
    assert_eq!(event.source, EventSource::Imported);
}

fn settings() -> SyncSettings {
    SyncSettings {
        remote_timeout_ms: 200,
        max_retries: 1,
        backoff_base_ms: 1,
    }
}

#[tokio::test]
async fn test_import_on_two_devices_maps_to_one_remote_document() {
    let dir = tempfile::tempdir().unwrap();
    let importer = JsonImporter::new(write_calendar(dir.path(), "Guest lecture"));
    let remote = Arc::new(MemoryRemote::new());
    let settings = settings();

    let laptop = Arc::new(LocalStore::in_memory());
    let phone = Arc::new(LocalStore::in_memory());
    import_into(&laptop, OWNER, &importer, at(0), at(23), at(8)).unwrap();
    import_into(&phone, OWNER, &importer, at(0), at(23), at(8)).unwrap();

    let laptop_sync = Reconciler::new(Arc::clone(&laptop), remote.clone(), settings.clone());
    let phone_sync = Reconciler::new(Arc::clone(&phone), remote.clone(), settings);
    laptop_sync.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();
    let report = phone_sync.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();

    assert!(report.conflicts.iter().all(|c| !c.resolution.local_lost()));
    assert_eq!(remote.live_documents(OWNER).len(), 1);
    assert!(phone.pending_changes(OWNER).is_empty());
}

#[test]
fn test_user_edit_shadows_later_import() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::in_memory();
    import_into(&store, OWNER, &JsonImporter::new(write_calendar(dir.path(), "Guest lecture")), at(0), at(23), at(8))
        .unwrap();

    let mut edited = store.live_events(OWNER).remove(0);
    edited.title = "Guest lecture (moved to hall B)".to_string();
    edited.last_modified = at(9);
    store.update(edited).unwrap();

    let importer = JsonImporter::new(write_calendar(dir.path(), "Guest lecture (updated)"));
    let summary = import_into(&store, OWNER, &importer, at(0), at(23), at(10)).unwrap();

    assert_eq!(summary.shadowed, 1);
    assert_eq!(store.live_events(OWNER)[0].title, "Guest lecture (moved to hall B)");
}

#[tokio::test]
async fn test_deleted_import_stays_deleted_after_reimport() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("studybuddy.db");
    let importer = JsonImporter::new(write_calendar(dir.path(), "Guest lecture"));
    let remote = Arc::new(MemoryRemote::new());
    let id = EventId::from_external(OWNER, "cal-42");

    {
        let store = Arc::new(LocalStore::open(&db_path).unwrap());
        let reconciler = Reconciler::new(Arc::clone(&store), remote.clone(), settings());
        import_into(&store, OWNER, &importer, at(0), at(23), at(8)).unwrap();
        reconciler.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();

        store.delete(OWNER, id, at(12), DeleteOptions::default()).unwrap();
        reconciler.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();
        assert!(store.get(OWNER, &id).is_none());
        assert!(remote.get(OWNER, &id).unwrap().deleted);
    }

    // The confirmed deletion survives a restart and shadows the import.
    let store = Arc::new(LocalStore::open(&db_path).unwrap());
    let summary = import_into(&store, OWNER, &importer, at(0), at(23), at(13)).unwrap();
    assert_eq!(summary.shadowed, 1);
    assert_eq!(summary.inserted, 0);
    assert!(store.pending_changes(OWNER).is_empty());

    let reconciler = Reconciler::new(Arc::clone(&store), remote.clone(), settings());
    let report = reconciler.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();
    assert_eq!(report.pushed, 0);
    assert!(remote.get(OWNER, &id).unwrap().deleted);
}

#[tokio::test]
async fn test_stale_import_on_other_device_loses_to_remote_delete() {
    let dir = tempfile::tempdir().unwrap();
    let importer = JsonImporter::new(write_calendar(dir.path(), "Guest lecture"));
    let remote = Arc::new(MemoryRemote::new());
    let id = EventId::from_external(OWNER, "cal-42");

    let laptop = Arc::new(LocalStore::in_memory());
    let laptop_sync = Reconciler::new(Arc::clone(&laptop), remote.clone(), settings());
    import_into(&laptop, OWNER, &importer, at(0), at(23), at(8)).unwrap();
    laptop_sync.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();
    laptop.delete(OWNER, id, at(9), DeleteOptions::default()).unwrap();
    laptop_sync.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();

    // The phone imported later but never saw the deletion.
    let phone = Arc::new(LocalStore::in_memory());
    let phone_sync = Reconciler::new(Arc::clone(&phone), remote.clone(), settings());
    import_into(&phone, OWNER, &importer, at(0), at(23), at(14)).unwrap();
    let report = phone_sync.run_cycle(OWNER, &CancelHandle::new()).await.unwrap();

    assert_eq!(report.pushed, 0);
    assert_eq!(report.conflicts.len(), 1);
    assert!(report.conflicts[0].resolution.local_lost());
    assert!(remote.get(OWNER, &id).unwrap().deleted);
    assert!(phone.live_events(OWNER).is_empty());

    let summary = import_into(&phone, OWNER, &importer, at(0), at(23), at(15)).unwrap();
    assert_eq!(summary.shadowed, 1);
}
