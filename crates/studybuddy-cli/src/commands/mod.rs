//! Subcommands and the helpers they share.

pub mod audit;
pub mod config;
pub mod event;
pub mod focus;
pub mod import;
pub mod plan;
pub mod sync;
pub mod tasks;

use chrono::{DateTime, NaiveDateTime, Utc};
use studybuddy_core::{Event, EventId, LocalStore, OwnerId};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn owner(raw: &str) -> Result<OwnerId, Box<dyn std::error::Error>> {
    Ok(OwnerId::new(raw)?)
}

pub fn open_store() -> Result<LocalStore, Box<dyn std::error::Error>> {
    Ok(LocalStore::open_default()?)
}

/// RFC 3339, or `YYYY-MM-DDTHH:MM` / `YYYY-MM-DD HH:MM` taken as UTC.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid time '{raw}': expected RFC 3339 or YYYY-MM-DDTHH:MM"))
}

pub fn parse_id(raw: &str) -> Result<EventId, String> {
    raw.parse().map_err(|e| format!("invalid event id '{raw}': {e}"))
}

pub fn print_event(event: &Event) {
    let module = event
        .module_id
        .as_deref()
        .map(|m| format!(" [{m}]"))
        .unwrap_or_default();
    let deleted = if event.deleted { " (deleted)" } else { "" };
    println!(
        "{}  {} - {}  {:<16} {}{}{}  rev {} {}",
        event.id,
        event.start.format("%Y-%m-%d %H:%M"),
        event.end.format("%H:%M"),
        event.category.as_str(),
        event.title,
        module,
        deleted,
        event.revision,
        event.source.as_str(),
    );
}
