//! Long-running queue worker for the mail relay

#[cfg(not(unix))]
compile_error!("Only unix is currently supported");

use std::path::PathBuf;

use clap::Parser;
use mailrelay::{Config, controller, logging};

/// Drain the mail queue and deliver through the configured mail API
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file, overriding the default search path
    #[arg(short, long, env = "MAILRELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    config.validate()?;

    logging::init(&config.log_dir.join("queue_worker.log"));

    controller::run(&config).await
}
