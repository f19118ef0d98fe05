use std::sync::Arc;

use tokio::{
    signal::unix::{self, SignalKind},
    sync::broadcast,
};

use crate::{
    Config, Signal,
    auth::CredentialProvider,
    delivery::{self, GraphMailer},
    internal,
    lock::{LockOutcome, OsProbe, WorkerLock},
    queue::Queue,
    worker::Worker,
};

/// SIGINT and SIGTERM listeners, installed before the lock is taken so an
/// early signal is held for the shutdown path.
struct Termination {
    interrupt: unix::Signal,
    terminate: unix::Signal,
}

impl Termination {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: unix::signal(SignalKind::interrupt())?,
            terminate: unix::signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

/// Ask the worker to stop on the first signal; return on the second so an
/// in-flight request can be abandoned.
async fn shutdown(
    mut termination: Termination,
    sender: broadcast::Sender<Signal>,
) -> anyhow::Result<()> {
    termination.recv().await;
    internal!(
        level = INFO,
        "Stopping the worker -- send the signal again to force shutdown"
    );

    sender
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    termination.recv().await;
    tracing::warn!("Forced shutdown, abandoning in-flight delivery");

    Ok(())
}

/// Run the queue worker until it is signalled.
///
/// Returns `Ok` without doing anything when another live worker holds the
/// lock. The lock is released on every exit path.
///
/// # Errors
/// If the signal handlers cannot be installed, the lock file cannot be
/// written, the queue directory cannot be opened, or the HTTP client cannot
/// be built
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let termination = Termination::install()?;

    let lock = match WorkerLock::acquire(&config.lock_file, &OsProbe)? {
        LockOutcome::Acquired(lock) => lock,
        LockOutcome::AlreadyRunning(pid) => {
            tracing::warn!("Mail worker already running (pid {pid}), not starting another");
            return Ok(());
        }
    };

    let ret = serve(config, termination).await;

    lock.release();
    internal!(level = INFO, "Worker shut down");

    ret
}

async fn serve(config: &Config, termination: Termination) -> anyhow::Result<()> {
    let queue = Queue::open(&config.queue_dir)?;
    queue.cleanup_stale_temp_files().await?;

    let http = delivery::http_client(config)?;
    let mut worker = Worker::new(
        queue,
        Arc::new(CredentialProvider::new(config, http.clone())),
        Arc::new(GraphMailer::new(config, http)),
        config.poll_interval(),
    );

    internal!(level = INFO, "Mail worker started as {}", config.sender);

    let (sender, receiver) = broadcast::channel(4);

    tokio::select! {
        () = worker.run(receiver) => Ok(()),
        r = shutdown(termination, sender) => r,
    }
}
