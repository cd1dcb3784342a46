//! Conflict audit log and quarantine commands.

use chrono::Utc;
use clap::Subcommand;
use studybuddy_core::{EventId, OwnerId};

use super::{open_store, parse_id, print_event, CmdResult};

#[derive(Subcommand)]
pub enum AuditAction {
    /// List conflict losers
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-apply a losing payload as a new local edit
    Restore {
        /// Audit entry ID
        audit_id: u64,
    },
}

#[derive(Subcommand)]
pub enum QuarantineAction {
    /// List quarantined changes
    List,
    /// Return a quarantined change to the sync queue
    Release {
        /// Event ID
        #[arg(value_parser = parse_id)]
        id: EventId,
    },
}

pub fn run(owner: &OwnerId, action: AuditAction) -> CmdResult {
    let store = open_store()?;
    let owner = owner.as_str();

    match action {
        AuditAction::List { json } => {
            let entries = store.audit_log(owner);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No conflicts recorded.");
            } else {
                for entry in &entries {
                    println!(
                        "#{}  {}  lost to rev {} at {}",
                        entry.id,
                        entry.event_id,
                        entry.winning_revision,
                        entry.recorded_at.format("%Y-%m-%d %H:%M")
                    );
                    print!("    ");
                    print_event(&entry.losing_payload);
                }
            }
        }
        AuditAction::Restore { audit_id } => {
            let restored = store.restore_from_audit(owner, audit_id, Utc::now())?;
            println!("Restored {} from audit entry #{audit_id}", restored.id);
        }
    }
    Ok(())
}

pub fn run_quarantine(owner: &OwnerId, action: QuarantineAction) -> CmdResult {
    let store = open_store()?;
    let owner = owner.as_str();

    match action {
        QuarantineAction::List => {
            let quarantined: Vec<_> = store
                .pending_changes(owner)
                .into_iter()
                .filter(|c| c.state == studybuddy_core::ChangeState::Quarantined)
                .collect();
            if quarantined.is_empty() {
                println!("Nothing quarantined.");
            }
            for change in quarantined {
                println!(
                    "{}  {}  {}",
                    change.event_id,
                    change.payload.title,
                    change.last_error.unwrap_or_default()
                );
            }
        }
        QuarantineAction::Release { id } => {
            store.release_quarantine(owner, &id)?;
            println!("Released {id}");
        }
    }
    Ok(())
}
