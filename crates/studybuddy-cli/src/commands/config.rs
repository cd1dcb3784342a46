use clap::Subcommand;
use studybuddy_core::Config;

use super::CmdResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Get a config value
    Get {
        /// Config key (e.g. "sync.max_retries")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
}

pub fn run(action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default();
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            let path = Config::path()?;
            if path.exists() && !force {
                return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
            }
            Config::default().save()?;
            println!("wrote {}", path.display());
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("ok");
        }
    }
    Ok(())
}
