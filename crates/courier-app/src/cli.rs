//! CLI argument definitions for the Courier binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Courier: moves task files through stage folders and executes approved actions.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Vault root holding the stage folders.
    #[arg(long = "vault", global = true)]
    pub vault: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ingest, classify and execute approvals every poll cycle.
    Run(WatchArgs),
    /// Execute approved actions only.
    Execute(WatchArgs),
    /// Classify `Needs_Action` once.
    Classify(PassArgs),
    /// Move `Inbox` into `Needs_Action` once.
    Ingest(PassArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct WatchArgs {
    /// Run a single cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Simulate actions; no remote calls, moves or writes.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Seconds between poll cycles.
    #[arg(long = "interval")]
    pub interval: Option<u64>,
}

impl WatchArgs {
    /// Priority: --interval flag > config file value.
    pub fn resolve_interval(&self, config_secs: u64) -> Duration {
        Duration::from_secs(self.interval.unwrap_or(config_secs).max(1))
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PassArgs {
    /// Report what would happen without changing the vault.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > COURIER_CONFIG env var > ~/.courier/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("COURIER_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the vault root.
    ///
    /// Priority: --vault flag > config file value.
    pub fn resolve_vault(&self, config_vault: PathBuf) -> PathBuf {
        self.vault.clone().unwrap_or(config_vault)
    }

    /// Resolve the log filter directive. `RUST_LOG` still wins over this.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if self.debug {
            "debug".to_string()
        } else {
            config_level.to_string()
        }
    }

    pub fn is_dry_run(&self) -> bool {
        match &self.command {
            Command::Run(args) | Command::Execute(args) => args.dry_run,
            Command::Classify(args) | Command::Ingest(args) => args.dry_run,
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".courier").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".courier").join("config.toml");
    }
    PathBuf::from("config.toml")
}
