//! sendmail-compatible entry point placing one message in the mail queue

#[cfg(not(unix))]
compile_error!("Only unix is currently supported");

use std::path::PathBuf;

use clap::Parser;
use mailrelay::{Config, Queue, logging};
use tokio::io::AsyncReadExt;

/// Read one message from standard input and place it in the mail queue
///
/// Accepts and ignores the usual sendmail flags (`-t`, `-i`, `-f sender`,
/// recipients), so it can be installed as a `sendmail` replacement. The
/// recipient is always taken from the message's `To` header.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file, overriding the default search path
    #[arg(long, env = "MAILRELAY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    sendmail_args: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    config.validate_queue()?;

    logging::init(&config.log_dir.join("queue_writer.log"));

    if !args.sendmail_args.is_empty() {
        tracing::debug!("Ignoring sendmail arguments {:?}", args.sendmail_args);
    }

    let mut message = Vec::new();
    tokio::io::stdin().read_to_end(&mut message).await?;

    let queued = match Queue::open(&config.queue_dir) {
        Ok(queue) => queue.enqueue(&message).await,
        Err(e) => Err(e),
    };

    if let Err(e) = queued {
        tracing::error!("Failed to queue message: {e}");
        return Err(e.into());
    }

    Ok(())
}
