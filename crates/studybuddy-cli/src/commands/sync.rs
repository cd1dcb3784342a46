//! Sync subcommand.
//!
//! The document store is simulated by a JSON file so several data
//! directories (devices) can reconcile against the same remote.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use studybuddy_core::storage::data_dir;
use studybuddy_core::{CancelHandle, Config, MemoryRemote, OwnerId, Reconciler, SyncReport};

use super::{open_store, CmdResult};

#[derive(Args)]
pub struct SyncArgs {
    /// Remote document store file (default: <data dir>/remote.json)
    #[arg(long, env = "STUDYBUDDY_REMOTE")]
    remote: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(owner: &OwnerId, args: SyncArgs) -> CmdResult {
    let remote_path = match args.remote {
        Some(path) => path,
        None => data_dir()?.join("remote.json"),
    };
    let config = Config::load_or_default();
    let store = Arc::new(open_store()?);
    let remote = Arc::new(MemoryRemote::load(&remote_path)?);
    tracing::debug!(remote = %remote_path.display(), "loaded document store");
    let reconciler = Reconciler::new(store, remote.clone(), config.sync);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let cancel = CancelHandle::new();
    let report = runtime.block_on(async {
        // Ctrl-C stops the cycle between ids; undelivered changes stay queued.
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let report = reconciler.run_cycle(owner.as_str(), &cancel).await;
        watcher.abort();
        report
    })?;

    remote.save(&remote_path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.is_noop() {
        println!("Already up to date (watermark {}).", report.watermark_after);
        return;
    }
    println!(
        "Pushed {}, pulled {}, merged {}, watermark {} -> {}",
        report.pushed, report.pulled, report.merged, report.watermark_before, report.watermark_after
    );
    for conflict in &report.conflicts {
        println!("  conflict on {}: {:?}", conflict.event_id, conflict.resolution);
    }
    for id in &report.requeued {
        println!("  requeued {id}");
    }
    for id in &report.quarantined {
        println!("  quarantined {id}");
    }
    for rejected in &report.rejected {
        println!("  rejected remote {} (rev {}): {}", rejected.event_id, rejected.revision, rejected.reason);
    }
    if report.cancelled {
        println!("Cycle cancelled; remaining changes stay queued.");
    } else if !report.complete {
        println!("Some changes could not be delivered; run sync again later.");
    }
}
