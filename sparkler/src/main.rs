//! Sparkler - snap / open-palm gesture recognizer driven over stdio.
//!
//! Reads s-expression requests from stdin (hand joints, frame ticks,
//! config changes) and answers each on stdout.  Logs go to stderr.

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use sparkler::config::Config;
use sparkler::ipc;
use sparkler::state::SparklerState;

#[derive(Parser, Debug)]
#[command(name = "sparkler", about = "Snap and open-palm gesture recognizer")]
struct Cli {
    /// TOML config file (default: built-in thresholds)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log all requests and responses to stderr
    #[arg(long)]
    log_trace: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("sparkler {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // stdout carries the protocol; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cli.log_trace {
                    "sparkler=debug".into()
                } else {
                    "sparkler=info".into()
                }
            }),
        )
        .init();

    info!("sparkler v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_default(cli.config.as_deref())?;
    let gesture = config.gesture_config().context("invalid [gesture] config")?;
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "loaded config");
    }

    let mut state = SparklerState::new(gesture);
    let stdin = io::stdin();
    let stdout = io::stdout();
    ipc::serve(&mut state, stdin.lock(), stdout.lock(), cli.log_trace)
        .context("stdio transport failed")?;
    Ok(())
}
