use chrono::{DateTime, Utc};
use clap::Args;
use studybuddy_core::focus::{DEFAULT_BREAK_MINS, DEFAULT_ITERATIONS, DEFAULT_STUDY_MINS};
use studybuddy_core::{record_focus_session, Config, FocusSession, OwnerId};

use super::{open_store, parse_time, print_event, CmdResult};

#[derive(Args)]
pub struct FocusArgs {
    /// Study minutes per cycle
    #[arg(long, default_value_t = DEFAULT_STUDY_MINS)]
    study_mins: u32,
    /// Break minutes per cycle (0 skips breaks)
    #[arg(long, default_value_t = DEFAULT_BREAK_MINS)]
    break_mins: u32,
    /// Number of study/break cycles
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: u32,
    /// When the run finished (default: now)
    #[arg(long, value_parser = parse_time)]
    at: Option<DateTime<Utc>>,
    /// Event title (default from config)
    #[arg(long)]
    title: Option<String>,
    /// Module studied
    #[arg(long)]
    module: Option<String>,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

/// Record a completed focus run as a study session.
pub fn run(owner: &OwnerId, args: FocusArgs) -> CmdResult {
    let config = Config::load_or_default();
    let store = open_store()?;

    let mut session = FocusSession::new(
        args.study_mins,
        args.break_mins,
        args.iterations,
        args.at.unwrap_or_else(Utc::now),
    );
    if let Some(title) = args.title {
        session = session.with_title(title);
    }
    if let Some(module) = args.module {
        session = session.with_module(module);
    }

    let stored = record_focus_session(
        &store,
        owner.as_str(),
        &session,
        &config.scheduler.default_session_title,
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        print_event(&stored);
        println!(
            "Logged {} study minutes over {} cycle(s).",
            session.study_time().num_minutes(),
            session.iterations
        );
    }
    Ok(())
}
