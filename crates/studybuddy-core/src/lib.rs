//! # StudyBuddy Core Library
//!
//! Study-session scheduling and multi-source calendar sync. Every operation
//! is available through the `studybuddy` CLI, which is a thin layer over
//! this crate.
//!
//! ## Architecture
//!
//! - **Event model**: calendar events owned by one user, with revisions,
//!   soft-delete tombstones and a source (`Local`, `Imported`, `Remote`)
//! - **Local store**: per-owner partitions of events, pending changes and
//!   sync bookkeeping, optionally written through to SQLite
//! - **Remote adapter**: async conditional-write document store contract
//! - **Reconciliation**: pushes pending changes, pulls remote ones above the
//!   watermark and settles conflicts deterministically
//! - **Scheduler**: proposes study sessions into free time
//! - **Import**: external calendars and weekly timetables as `Imported` events
//! - **Focus**: completed focus runs recorded as study sessions
//!
//! ## Key Components
//!
//! - [`LocalStore`]: local source of truth; mutations never wait on the network
//! - [`Reconciler`]: one reconciliation cycle per owner at a time
//! - [`Scheduler`]: greedy earliest-first study planner
//! - [`Config`]: TOML configuration

pub mod error;
pub mod event;
pub mod focus;
pub mod identity;
pub mod import;
pub mod remote;
pub mod scheduler;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use event::{overlaps, Event, EventCategory, EventId, EventSource};
pub use focus::{record_focus_session, FocusSession};
pub use identity::{IdentityProvider, OwnerId, StaticIdentity};
pub use import::{import_into, CalendarImporter, ExternalEvent, ImportSummary, JsonImporter, WeeklyTimetable};
pub use remote::{MemoryRemote, RemoteAdapter, RemoteError};
pub use scheduler::{ProposalSummary, ScheduleWindow, Scheduler, StudyGoal, StudyTask, TaskPriority};
pub use storage::{
    AuditEntry, ChangeOp, ChangeState, Config, Database, DeleteOptions, ImportOutcome, LocalStore,
    PendingChange,
};
pub use sync::{CancelHandle, ConflictRecord, Reconciler, Resolution, SyncError, SyncReport};
