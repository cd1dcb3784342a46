use chrono::{DateTime, Duration, Utc};
use clap::Args;
use studybuddy_core::{Config, OwnerId, Scheduler};

use super::{open_store, parse_time, print_event, CmdResult};

#[derive(Args)]
pub struct PlanArgs {
    /// Total study time to place, in minutes
    #[arg(long)]
    minutes: i64,
    /// Earliest start
    #[arg(long, value_parser = parse_time)]
    from: DateTime<Utc>,
    /// Latest end
    #[arg(long, value_parser = parse_time)]
    to: DateTime<Utc>,
    /// Session length in minutes (default from config)
    #[arg(long)]
    granularity: Option<i64>,
    /// Session title (default from config)
    #[arg(long)]
    title: Option<String>,
    /// Module the sessions are for
    #[arg(long)]
    module: Option<String>,
    /// Save the proposals as events
    #[arg(long)]
    accept: bool,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(owner: &OwnerId, args: PlanArgs) -> CmdResult {
    let config = Config::load_or_default();
    let store = open_store()?;
    let scheduler = Scheduler::with_settings(config.scheduler);

    let mut goal = scheduler.goal(minutes(args.minutes)?, args.from, args.to);
    if let Some(granularity) = args.granularity {
        goal.session_granularity = minutes(granularity)?;
    }
    if let Some(title) = args.title {
        goal = goal.with_title(title);
    }
    if let Some(module) = args.module {
        goal = goal.with_module(module);
    }

    let summary = scheduler.plan(&store, owner.as_str(), &goal)?;

    if args.accept {
        for proposal in &summary.proposals {
            store.upsert(proposal.clone())?;
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.proposals.is_empty() {
        println!("No free time in range.");
    } else {
        summary.proposals.iter().for_each(print_event);
    }
    println!(
        "Placed {} of {} minutes{}",
        summary.placed.num_minutes(),
        summary.requested.num_minutes(),
        if summary.is_satisfied() {
            String::new()
        } else {
            format!(" ({} minutes unmet)", summary.unmet.num_minutes())
        }
    );
    if args.accept {
        println!("Saved {} study sessions.", summary.proposals.len());
    }
    Ok(())
}

fn minutes(value: i64) -> Result<Duration, String> {
    Duration::try_minutes(value).ok_or_else(|| format!("{value} minutes is out of range"))
}
