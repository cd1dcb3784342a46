//! SQLite persistence for the local store.
//!
//! Stores, per owner:
//! - Cached events (tombstones included)
//! - The pending-change queue
//! - Remote base copies, the conflict audit log and the sync watermark
//!
//! The in-memory [`Partition`] is authoritative while the process runs; this
//! module only loads it at startup and writes through the rows a mutation
//! touched.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::data_dir;
use super::migrations;
use super::partition::{Partition, Touched};
use super::pending::{AuditEntry, PendingChange};
use crate::error::DatabaseError;
use crate::event::{Event, EventId};

/// SQLite database backing a [`LocalStore`](super::LocalStore).
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File the database lives in, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open the database at `<data_dir>/studybuddy.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened
    /// or migrated.
    pub fn open_default() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Self::open(dir.join("studybuddy.db"))
    }

    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let db = Self {
            conn,
            path: Some(path),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Load every owner's partition.
    pub fn load_partitions(&self) -> Result<Vec<Partition>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id FROM events
             UNION SELECT owner_id FROM pending_changes
             UNION SELECT owner_id FROM remote_base
             UNION SELECT owner_id FROM audit_log
             UNION SELECT owner_id FROM sync_state
             ORDER BY owner_id",
        )?;
        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        owners
            .into_iter()
            .map(|owner| self.load_partition(&owner))
            .collect()
    }

    /// Load one owner's partition; unknown owners yield an empty partition.
    pub fn load_partition(&self, owner_id: &str) -> Result<Partition, DatabaseError> {
        let events = self.load_events(owner_id)?;
        let pending = self.load_pending(owner_id)?;
        let remote_base = self.load_remote_base(owner_id)?;
        let audit = self.load_audit(owner_id)?;
        let watermark = self
            .conn
            .query_row(
                "SELECT watermark FROM sync_state WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get::<_, u64>(0),
            )
            .optional()?
            .unwrap_or(0);

        Ok(Partition::from_parts(
            owner_id.to_string(),
            events,
            pending,
            remote_base,
            audit,
            watermark,
        ))
    }

    fn load_events(&self, owner_id: &str) -> Result<Vec<Event>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, title, start_at, end_at, source, revision,
                    last_modified, deleted, category, external_id, module_id
             FROM events WHERE owner_id = ?1",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                title: row.get(2)?,
                start_at: row.get(3)?,
                end_at: row.get(4)?,
                source: row.get(5)?,
                revision: row.get(6)?,
                last_modified: row.get(7)?,
                deleted: row.get(8)?,
                category: row.get(9)?,
                external_id: row.get(10)?,
                module_id: row.get(11)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    fn load_pending(&self, owner_id: &str) -> Result<Vec<PendingChange>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, op, base_revision, payload, state, sequence, attempts, last_error
             FROM pending_changes WHERE owner_id = ?1",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut changes = Vec::new();
        for row in rows {
            let (event_id, op, base_revision, payload, state, sequence, attempts, last_error) = row?;
            changes.push(PendingChange {
                event_id: parse_id("pending_changes", &event_id)?,
                op: op.parse().map_err(|m| corrupt("pending_changes", m))?,
                base_revision,
                payload: parse_json("pending_changes", &payload)?,
                state: state.parse().map_err(|m| corrupt("pending_changes", m))?,
                sequence,
                attempts,
                last_error,
            });
        }
        Ok(changes)
    }

    fn load_remote_base(&self, owner_id: &str) -> Result<Vec<Event>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM remote_base WHERE owner_id = ?1")?;
        let rows = stmt.query_map(params![owner_id], |row| row.get::<_, String>(0))?;

        let mut bases = Vec::new();
        for row in rows {
            bases.push(parse_json("remote_base", &row?)?);
        }
        Ok(bases)
    }

    fn load_audit(&self, owner_id: &str) -> Result<Vec<AuditEntry>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_id, losing_payload, winning_revision, recorded_at
             FROM audit_log WHERE owner_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, event_id, payload, winning_revision, recorded_at) = row?;
            entries.push(AuditEntry {
                id,
                event_id: parse_id("audit_log", &event_id)?,
                losing_payload: parse_json("audit_log", &payload)?,
                winning_revision,
                recorded_at: parse_time("audit_log", &recorded_at)?,
            });
        }
        Ok(entries)
    }

    /// Persist the rows `touched` names, in one transaction.
    pub(crate) fn write_through(
        &mut self,
        partition: &Partition,
        touched: &Touched,
    ) -> Result<(), DatabaseError> {
        if touched.is_empty() {
            return Ok(());
        }
        let owner = partition.owner_id();
        let tx = self.conn.transaction()?;

        for id in &touched.events {
            match partition.get(id) {
                Some(event) => write_event(&tx, event)?,
                None => {
                    tx.execute(
                        "DELETE FROM events WHERE owner_id = ?1 AND id = ?2",
                        params![owner, id.as_str()],
                    )?;
                }
            }
        }

        for id in &touched.pending {
            match partition.pending(id) {
                Some(change) => write_pending(&tx, owner, change)?,
                None => {
                    tx.execute(
                        "DELETE FROM pending_changes WHERE owner_id = ?1 AND event_id = ?2",
                        params![owner, id.as_str()],
                    )?;
                }
            }
        }

        for id in &touched.remote_base {
            match partition.remote_base(id) {
                Some(base) => {
                    tx.execute(
                        "INSERT OR REPLACE INTO remote_base (owner_id, event_id, revision, payload)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![owner, id.as_str(), base.revision, to_json(base)?],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM remote_base WHERE owner_id = ?1 AND event_id = ?2",
                        params![owner, id.as_str()],
                    )?;
                }
            }
        }

        for audit_id in &touched.audit {
            if let Some(entry) = partition.audit_entry(*audit_id) {
                tx.execute(
                    "INSERT OR REPLACE INTO audit_log
                        (owner_id, id, event_id, losing_payload, winning_revision, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        owner,
                        entry.id,
                        entry.event_id.as_str(),
                        to_json(&entry.losing_payload)?,
                        entry.winning_revision,
                        entry.recorded_at.to_rfc3339(),
                    ],
                )?;
            }
        }

        if touched.sync_state {
            tx.execute(
                "INSERT OR REPLACE INTO sync_state (owner_id, watermark) VALUES (?1, ?2)",
                params![owner, partition.watermark()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn write_event(tx: &Transaction<'_>, event: &Event) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT OR REPLACE INTO events
            (owner_id, id, title, start_at, end_at, source, revision,
             last_modified, deleted, category, external_id, module_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            event.owner_id,
            event.id.as_str(),
            event.title,
            event.start.to_rfc3339(),
            event.end.to_rfc3339(),
            event.source.as_str(),
            event.revision,
            event.last_modified.to_rfc3339(),
            event.deleted,
            event.category.as_str(),
            event.external_id,
            event.module_id,
        ],
    )?;
    Ok(())
}

fn write_pending(tx: &Transaction<'_>, owner: &str, change: &PendingChange) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT OR REPLACE INTO pending_changes
            (owner_id, event_id, op, base_revision, payload, state, sequence, attempts, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            owner,
            change.event_id.as_str(),
            change.op.as_str(),
            change.base_revision,
            to_json(&change.payload)?,
            change.state.as_str(),
            change.sequence,
            change.attempts,
            change.last_error,
        ],
    )?;
    Ok(())
}

struct EventRow {
    id: String,
    owner_id: String,
    title: String,
    start_at: String,
    end_at: String,
    source: String,
    revision: u64,
    last_modified: String,
    deleted: bool,
    category: String,
    external_id: Option<String>,
    module_id: Option<String>,
}

impl EventRow {
    fn into_event(self) -> Result<Event, DatabaseError> {
        Ok(Event {
            id: parse_id("events", &self.id)?,
            owner_id: self.owner_id,
            title: self.title,
            start: parse_time("events", &self.start_at)?,
            end: parse_time("events", &self.end_at)?,
            source: self.source.parse().map_err(|m| corrupt("events", m))?,
            revision: self.revision,
            last_modified: parse_time("events", &self.last_modified)?,
            deleted: self.deleted,
            category: self.category.parse().map_err(|m| corrupt("events", m))?,
            external_id: self.external_id,
            module_id: self.module_id,
        })
    }
}

fn corrupt(table: &'static str, message: impl ToString) -> DatabaseError {
    DatabaseError::CorruptRow {
        table,
        message: message.to_string(),
    }
}

fn parse_id(table: &'static str, raw: &str) -> Result<EventId, DatabaseError> {
    raw.parse().map_err(|e| corrupt(table, format!("bad id '{raw}': {e}")))
}

fn parse_time(table: &'static str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("bad timestamp '{raw}': {e}")))
}

fn parse_json(table: &'static str, raw: &str) -> Result<Event, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| corrupt(table, e))
}

fn to_json(event: &Event) -> Result<String, DatabaseError> {
    serde_json::to_string(event).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
}
