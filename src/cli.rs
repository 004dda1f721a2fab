//! CLI argument types for `notion-guard`.
//!
//! Defined separately from `main.rs` so tests can construct them directly
//! when exercising the config override logic.

use std::path::PathBuf;

use clap::Parser;

use crate::config::GuardConfig;

/// Rate-limiting stdio guard for a Notion MCP server.
///
/// Sits between an MCP client and the backend server process, forwarding
/// NDJSON traffic in both directions. Mutating tool calls are rate limited
/// over a sliding one-hour window, oversized block-append calls are split
/// into paced batches, and every mutating operation is recorded in an
/// append-only JSONL log.
#[derive(Parser, Debug)]
#[command(name = "notion-guard", version)]
pub struct Cli {
    /// Maximum mutating operations per sliding hour (overrides
    /// MAX_OPERATIONS_PER_HOUR).
    #[arg(long)]
    pub rate_limit: Option<usize>,

    /// Maximum children per block-append call before splitting (overrides
    /// NOTION_BATCH_SIZE).
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Delay between split batches in milliseconds (overrides
    /// NOTION_BATCH_DELAY_MS).
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,

    /// Directory for operation log files (overrides NOTION_LOG_DIR).
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Disable writing operation logs to disk.
    #[arg(long)]
    pub no_file_log: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,

    /// Backend server command and arguments (after `--`).
    ///
    /// Defaults to `notion-mcp-server` when omitted.
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Fold CLI overrides into an environment-derived config.
    pub fn apply_to(&self, mut config: GuardConfig) -> GuardConfig {
        if let Some(rate_limit) = self.rate_limit {
            config.max_ops_per_hour = rate_limit;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(ms) = self.batch_delay_ms {
            config.batch_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(ref dir) = self.log_dir {
            config.log_dir = dir.clone();
        }
        if self.no_file_log {
            config.log_to_file = false;
        }
        config
    }

    /// Backend command and argument vector, with the stock server as default.
    pub fn backend_command(&self) -> (String, Vec<String>) {
        if self.command.is_empty() {
            ("notion-mcp-server".to_string(), Vec::new())
        } else {
            (self.command[0].clone(), self.command[1..].to_vec())
        }
    }
}
