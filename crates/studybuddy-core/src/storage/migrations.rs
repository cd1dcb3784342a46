//! Database schema migrations for studybuddy.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: events and the pending-change queue.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            owner_id      TEXT NOT NULL,
            id            TEXT NOT NULL,
            title         TEXT NOT NULL,
            start_at      TEXT NOT NULL,
            end_at        TEXT NOT NULL,
            source        TEXT NOT NULL,
            revision      INTEGER NOT NULL DEFAULT 0,
            last_modified TEXT NOT NULL,
            deleted       INTEGER NOT NULL DEFAULT 0,
            category      TEXT NOT NULL,
            external_id   TEXT,
            module_id     TEXT,
            PRIMARY KEY (owner_id, id)
        );

        CREATE TABLE IF NOT EXISTS pending_changes (
            owner_id      TEXT NOT NULL,
            event_id      TEXT NOT NULL,
            op            TEXT NOT NULL,
            base_revision INTEGER NOT NULL,
            payload       TEXT NOT NULL,
            state         TEXT NOT NULL,
            sequence      INTEGER NOT NULL,
            attempts      INTEGER NOT NULL DEFAULT 0,
            last_error    TEXT,
            PRIMARY KEY (owner_id, event_id)
        );

        CREATE INDEX IF NOT EXISTS idx_events_owner_start ON events(owner_id, start_at);
        CREATE INDEX IF NOT EXISTS idx_pending_owner_state ON pending_changes(owner_id, state);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: reconciliation bookkeeping.
///
/// Adds the remote base copies used for field-level merges, the conflict
/// audit log and the per-owner sync watermark.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS remote_base (
            owner_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            revision INTEGER NOT NULL,
            payload  TEXT NOT NULL,
            PRIMARY KEY (owner_id, event_id)
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            owner_id         TEXT NOT NULL,
            id               INTEGER NOT NULL,
            event_id         TEXT NOT NULL,
            losing_payload   TEXT NOT NULL,
            winning_revision INTEGER NOT NULL,
            recorded_at      TEXT NOT NULL,
            PRIMARY KEY (owner_id, id)
        );

        CREATE TABLE IF NOT EXISTS sync_state (
            owner_id  TEXT PRIMARY KEY,
            watermark INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_audit_owner_event ON audit_log(owner_id, event_id);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn test_migrate_fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        for table in ["events", "pending_changes", "remote_base", "audit_log", "sync_state"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_upgrades_v1_database() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert!(!table_exists(&conn, "audit_log"));

        migrate(&conn).unwrap();
        assert!(table_exists(&conn, "audit_log"));
        assert_eq!(get_schema_version(&conn).unwrap(), 2);
    }
}
