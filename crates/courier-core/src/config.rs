use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CourierError, Result};

/// Top-level configuration for the Courier pipeline.
///
/// Loaded from `~/.courier/config.toml` by default. Each section corresponds
/// to one pipeline component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub quotas: QuotasConfig,
    #[serde(default)]
    pub servers: ServersConfig,
}

impl CourierConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CourierConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CourierError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the stage-folder vault. `~/` is expanded to the home directory.
    pub vault_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            vault_dir: "./Vault".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GeneralConfig {
    /// Resolve `vault_dir`, expanding a leading `~/` to `$HOME`.
    pub fn vault_path(&self) -> PathBuf {
        expand_home(&self.vault_dir)
    }
}

/// Retry, timeout and rate-window settings for the action executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Attempts per approval request, including the first.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: u32,
    /// Per remote call timeout.
    pub call_timeout_secs: u64,
    /// Actions allowed inside one sliding window, across all kinds.
    pub max_actions_per_window: usize,
    /// Sliding window length.
    pub window_secs: u64,
    /// Days of audit history searched for duplicate social posts.
    pub duplicate_lookback_days: u32,
    /// Hard cap on social post length unless the request overrides it.
    pub max_post_length: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2_000,
            backoff_multiplier: 2,
            call_timeout_secs: 30,
            max_actions_per_window: 10,
            window_secs: 3_600,
            duplicate_lookback_days: 7,
            max_post_length: 3_000,
        }
    }
}

/// Approval-folder watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
        }
    }
}

/// Hourly and daily caps for a single action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub max_per_hour: u32,
    pub max_per_day: u32,
}

impl QuotaLimits {
    pub const fn new(max_per_hour: u32, max_per_day: u32) -> Self {
        Self {
            max_per_hour,
            max_per_day,
        }
    }
}

/// Per action kind quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotasConfig {
    pub send_email: QuotaLimits,
    pub draft_email: QuotaLimits,
    pub search_emails: QuotaLimits,
    pub post_social: QuotaLimits,
}

impl Default for QuotasConfig {
    fn default() -> Self {
        Self {
            send_email: QuotaLimits::new(10, 50),
            draft_email: QuotaLimits::new(50, 200),
            search_emails: QuotaLimits::new(100, 500),
            post_social: QuotaLimits::new(5, 20),
        }
    }
}

/// Command line used to launch an external action server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// External action servers.
///
/// Without a `[servers]` section both defaults apply; inside the section a
/// missing entry disables that server's actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServersConfig {
    #[serde(default)]
    pub email: Option<ServerCommand>,
    #[serde(default)]
    pub social: Option<ServerCommand>,
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            email: Some(ServerCommand::new("node", &["action_servers/email/server.js"])),
            social: Some(ServerCommand::new("node", &["action_servers/social/server.js"])),
        }
    }
}

/// Expand a leading `~/` (or `~\` on Windows) to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").ok();
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").ok();
        if let Some(home) = home {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
