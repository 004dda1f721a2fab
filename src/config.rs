//! Guard configuration.
//!
//! Sources, in increasing precedence: built-in defaults, a discovered `.env`
//! file, the process environment, CLI flags. The `.env` loader never
//! overrides variables already present in the environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default mutating-operation ceiling per sliding hour.
pub const DEFAULT_MAX_OPS_PER_HOUR: usize = 100;

/// Default maximum `children` items per forwarded sub-batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default pacing delay between consecutive sub-batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Runtime configuration for the guard, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Ceiling on mutating operations admitted per sliding hour.
    pub max_ops_per_hour: usize,
    /// Maximum `children` items per sub-batch before splitting kicks in.
    pub batch_size: usize,
    /// Delay between consecutive sub-batch dispatches.
    pub batch_delay: Duration,
    /// Whether log entries are mirrored to a daily JSONL file.
    pub log_to_file: bool,
    /// Directory for the daily JSONL operation logs.
    pub log_dir: PathBuf,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_ops_per_hour: DEFAULT_MAX_OPS_PER_HOUR,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            log_to_file: true,
            log_dir: PathBuf::from(".notion-logs"),
        }
    }
}

impl GuardConfig {
    /// Load configuration from environment variables over the defaults.
    ///
    /// - `MAX_OPERATIONS_PER_HOUR` (default: 100)
    /// - `NOTION_BATCH_SIZE` (default: 20)
    /// - `NOTION_BATCH_DELAY_MS` (default: 500)
    /// - `LOG_TO_FILE` (default: true; only the literal `false` disables)
    /// - `NOTION_LOG_DIR` (default: `./.notion-logs`)
    ///
    /// Invalid values fall back to the default with a warning rather than
    /// failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MAX_OPERATIONS_PER_HOUR") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_ops_per_hour = n,
                _ => warn!(
                    env_var = "MAX_OPERATIONS_PER_HOUR",
                    value = %val,
                    default = DEFAULT_MAX_OPS_PER_HOUR,
                    "invalid value for environment variable, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("NOTION_BATCH_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.batch_size = n,
                _ => warn!(
                    env_var = "NOTION_BATCH_SIZE",
                    value = %val,
                    default = DEFAULT_BATCH_SIZE,
                    "invalid value for environment variable, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("NOTION_BATCH_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.batch_delay = Duration::from_millis(ms),
                Err(_) => warn!(
                    env_var = "NOTION_BATCH_DELAY_MS",
                    value = %val,
                    default_ms = DEFAULT_BATCH_DELAY.as_millis() as u64,
                    "invalid value for environment variable, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("LOG_TO_FILE") {
            config.log_to_file = val != "false";
        }

        if let Ok(val) = std::env::var("NOTION_LOG_DIR") {
            if !val.is_empty() {
                config.log_dir = PathBuf::from(val);
            }
        }

        config
    }
}

/// Load the first `.env` file found in the working directory or its parents.
///
/// Returns the path that was loaded, if any. Variables already set in the
/// process environment are never overridden. Failure to find or parse a file
/// is not an error — the guard runs fine on environment variables alone.
pub fn load_env_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    for dir in cwd.ancestors().take(3) {
        let candidate = dir.join(".env");
        if candidate.is_file() && dotenv::from_path(&candidate).is_ok() {
            return Some(candidate);
        }
    }
    None
}
