//! `notion-guard` entry point.
//!
//! Parses CLI arguments, loads environment configuration (including a nearby
//! `.env` file when present), then runs the stdio proxy around the backend
//! server. The process exit code mirrors the backend's.

use clap::Parser;

use notion_guard::cli::Cli;
use notion_guard::config::{load_env_file, GuardConfig};
use notion_guard::proxy::run_proxy;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(path) = load_env_file() {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let config = cli.apply_to(GuardConfig::from_env());
    let (command, args) = cli.backend_command();

    let code = match run_proxy(config, command, args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "guard failed");
            eprintln!("notion-guard: {e}");
            1
        }
    };

    std::process::exit(code);
}

/// Initialise tracing subscriber with stderr output.
///
/// Stdout carries protocol traffic, so diagnostics must never land there.
/// When `verbose` is true, sets filter to `debug`. Otherwise, respects the
/// `RUST_LOG` environment variable (defaulting to `info`).
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
