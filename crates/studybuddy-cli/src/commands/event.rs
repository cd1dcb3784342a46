//! Event management commands for CLI.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use studybuddy_core::{DeleteOptions, Event, EventCategory, EventId, OwnerId};

use super::{open_store, parse_id, parse_time, print_event, CmdResult};

#[derive(Subcommand)]
pub enum EventAction {
    /// Create a new event
    Add {
        /// Event title
        title: String,
        /// Start time (e.g. 2025-03-10T09:00)
        #[arg(long, value_parser = parse_time)]
        start: DateTime<Utc>,
        /// End time
        #[arg(long, value_parser = parse_time)]
        end: DateTime<Utc>,
        /// fixed or study
        #[arg(long, default_value = "fixed")]
        category: EventCategory,
        /// Module the event belongs to
        #[arg(long)]
        module: Option<String>,
    },
    /// Edit an existing event
    Update {
        /// Event ID
        #[arg(value_parser = parse_id)]
        id: EventId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_time)]
        end: Option<DateTime<Utc>>,
        #[arg(long)]
        category: Option<EventCategory>,
        #[arg(long)]
        module: Option<String>,
    },
    /// Delete an event
    Delete {
        /// Event ID
        #[arg(value_parser = parse_id)]
        id: EventId,
        /// Record a deletion for an id this device has never seen
        #[arg(long)]
        allow_unknown: bool,
    },
    /// List events
    List {
        /// Only events ending after this time
        #[arg(long, value_parser = parse_time)]
        from: Option<DateTime<Utc>>,
        /// Only events starting before this time
        #[arg(long, value_parser = parse_time)]
        to: Option<DateTime<Utc>>,
        /// Include tombstones
        #[arg(long)]
        all: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(owner: &OwnerId, action: EventAction) -> CmdResult {
    let store = open_store()?;
    let owner = owner.as_str();

    match action {
        EventAction::Add {
            title,
            start,
            end,
            category,
            module,
        } => {
            let mut event = Event::new(owner, title, start, end, category, Utc::now());
            event.module_id = module;
            let stored = store.upsert(event)?;
            println!("Event created: {}", stored.id);
        }
        EventAction::Update {
            id,
            title,
            start,
            end,
            category,
            module,
        } => {
            let mut event = store
                .get(owner, &id)
                .filter(|e| !e.deleted)
                .ok_or_else(|| format!("event not found: {id}"))?;
            if let Some(title) = title {
                event.title = title;
            }
            if let Some(start) = start {
                event.start = start;
            }
            if let Some(end) = end {
                event.end = end;
            }
            if let Some(category) = category {
                event.category = category;
            }
            if module.is_some() {
                event.module_id = module;
            }
            event.last_modified = Utc::now();
            let stored = store.update(event)?;
            println!("Event updated: {} (rev {})", stored.id, stored.revision);
        }
        EventAction::Delete { id, allow_unknown } => {
            store.delete(owner, id, Utc::now(), DeleteOptions { allow_unknown })?;
            println!("Event deleted: {id}");
        }
        EventAction::List { from, to, all, json } => {
            let events: Vec<Event> = if all {
                store.all_events(owner)
            } else {
                store.live_events(owner)
            }
            .into_iter()
            .filter(|e| from.map_or(true, |f| e.end > f) && to.map_or(true, |t| e.start < t))
            .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No events.");
            } else {
                events.iter().for_each(print_event);
            }
        }
    }
    Ok(())
}

pub fn pending(owner: &OwnerId, json: bool) -> CmdResult {
    let store = open_store()?;
    let changes = store.pending_changes(owner.as_str());

    if json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }
    if changes.is_empty() {
        println!("Nothing to sync.");
        return Ok(());
    }
    for change in &changes {
        let error = change
            .last_error
            .as_deref()
            .map(|e| format!("  last error: {e}"))
            .unwrap_or_default();
        println!(
            "{}  {:?} {:?}  base rev {}  attempts {}  {}{}",
            change.event_id,
            change.op,
            change.state,
            change.base_revision,
            change.attempts,
            change.payload.title,
            error,
        );
    }
    Ok(())
}
