//! Plan study time for a list of dated tasks.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::Args;
use studybuddy_core::{Config, OwnerId, Scheduler, StudyTask};

use super::{open_store, parse_time, print_event, CmdResult};

#[derive(Args)]
pub struct TasksArgs {
    /// JSON array of tasks ({id, title, module_id?, priority?, due_at?, completed?})
    file: PathBuf,
    /// Study minutes to place per task
    #[arg(long)]
    minutes: i64,
    /// Earliest start (default: now)
    #[arg(long, value_parser = parse_time)]
    from: Option<DateTime<Utc>>,
    /// Save the proposals as events
    #[arg(long)]
    accept: bool,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(owner: &OwnerId, args: TasksArgs) -> CmdResult {
    let tasks: Vec<StudyTask> = serde_json::from_str(&std::fs::read_to_string(&args.file)?)?;
    let per_task = Duration::try_minutes(args.minutes)
        .ok_or_else(|| format!("{} minutes is out of range", args.minutes))?;
    let now = Utc::now();

    let config = Config::load_or_default();
    let store = open_store()?;
    let scheduler = Scheduler::with_settings(config.scheduler);
    let plans = scheduler.plan_tasks(
        &store,
        owner.as_str(),
        &tasks,
        per_task,
        args.from.unwrap_or(now),
        now,
    )?;

    if args.accept {
        for (_, summary) in &plans {
            for proposal in &summary.proposals {
                store.upsert(proposal.clone())?;
            }
        }
    }

    if args.json {
        // [[task, summary], ...]
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    if plans.is_empty() {
        println!("No open tasks with a future due date.");
    }
    for (task, summary) in &plans {
        println!(
            "{} (due {}): {} of {} minutes",
            task.title,
            task.due_at.map(|d| d.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_default(),
            summary.placed.num_minutes(),
            summary.requested.num_minutes()
        );
        for proposal in &summary.proposals {
            print!("    ");
            print_event(proposal);
        }
    }
    Ok(())
}
