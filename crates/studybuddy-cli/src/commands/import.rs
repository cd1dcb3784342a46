use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::{Args, Subcommand};
use studybuddy_core::{import_into, CalendarImporter, ImportSummary, JsonImporter, OwnerId, WeeklyTimetable};

use super::{open_store, parse_time, CmdResult};

#[derive(Subcommand)]
pub enum ImportAction {
    /// Import a JSON array of external events
    Json {
        file: PathBuf,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Expand a weekly timetable into dated lectures
    Timetable {
        file: PathBuf,
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Args)]
pub struct RangeArgs {
    /// Start of the import range (default: now)
    #[arg(long, value_parser = parse_time)]
    from: Option<DateTime<Utc>>,
    /// End of the import range (default: four weeks after --from)
    #[arg(long, value_parser = parse_time)]
    to: Option<DateTime<Utc>>,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl RangeArgs {
    fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = self.from.unwrap_or(now);
        (from, self.to.unwrap_or(from + Duration::weeks(4)))
    }
}

pub fn run(owner: &OwnerId, action: ImportAction) -> CmdResult {
    match action {
        ImportAction::Json { file, range } => import(owner, &JsonImporter::new(file), &range),
        ImportAction::Timetable { file, range } => import(owner, &WeeklyTimetable::load(&file)?, &range),
    }
}

fn import(owner: &OwnerId, importer: &dyn CalendarImporter, range: &RangeArgs) -> CmdResult {
    let store = open_store()?;
    let now = Utc::now();
    let (from, to) = range.bounds(now);
    let summary = import_into(&store, owner.as_str(), importer, from, to, now)?;

    if range.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ImportSummary) {
    println!(
        "Imported from {}: {} new, {} updated, {} unchanged, {} shadowed",
        summary.source, summary.inserted, summary.updated, summary.unchanged, summary.shadowed
    );
    for invalid in &summary.invalid {
        println!("  skipped {}: {}", invalid.external_id, invalid.reason);
    }
}
