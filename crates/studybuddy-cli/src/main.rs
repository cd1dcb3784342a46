use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "studybuddy", version, about = "StudyBuddy study planner and calendar sync")]
struct Cli {
    /// Owner whose events are read and written
    #[arg(long, global = true, env = "STUDYBUDDY_OWNER", default_value = "me")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, edit, delete and list events
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Show local changes waiting to be synced
    Pending {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import external calendars
    Import {
        #[command(subcommand)]
        action: commands::import::ImportAction,
    },
    /// Run one reconciliation cycle against the document store
    Sync(commands::sync::SyncArgs),
    /// Propose study sessions in free time
    Plan(commands::plan::PlanArgs),
    /// Plan study time for dated tasks, most urgent first
    Tasks(commands::tasks::TasksArgs),
    /// Record a completed focus run as a study session
    Focus(commands::focus::FocusArgs),
    /// Inspect and restore conflict losers
    Audit {
        #[command(subcommand)]
        action: commands::audit::AuditAction,
    },
    /// Manage changes the document store rejected
    Quarantine {
        #[command(subcommand)]
        action: commands::audit::QuarantineAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("STUDYBUDDY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = commands::owner(&cli.owner).and_then(|owner| match cli.command {
        Commands::Event { action } => commands::event::run(&owner, action),
        Commands::Pending { json } => commands::event::pending(&owner, json),
        Commands::Import { action } => commands::import::run(&owner, action),
        Commands::Sync(args) => commands::sync::run(&owner, args),
        Commands::Plan(args) => commands::plan::run(&owner, args),
        Commands::Tasks(args) => commands::tasks::run(&owner, args),
        Commands::Focus(args) => commands::focus::run(&owner, args),
        Commands::Audit { action } => commands::audit::run(&owner, action),
        Commands::Quarantine { action } => commands::audit::run_quarantine(&owner, action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "studybuddy", &mut std::io::stdout());
            Ok(())
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
