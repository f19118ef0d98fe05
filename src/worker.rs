//! The poll loop draining the queue.
//!
//! Each cycle obtains one token, then walks the queue in filename order and
//! sends every message strictly one after another. A message is removed only
//! after the remote side accepted it, so a crash in between leads to a
//! duplicate send rather than a lost message.
//!
//! Failures never stop the loop:
//! - a token failure abandons the cycle before any message is touched
//! - a parse, delivery, or filesystem failure is counted and logged, and the
//!   file is left for the next cycle
//!
//! There is no backoff and no attempt limit; a message that can never be
//! delivered is retried every cycle until an operator removes it.

use std::{sync::Arc, time::Duration};

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    Signal,
    auth::TokenProvider,
    delivery::Mailer,
    error::Result,
    internal,
    message::ParsedMessage,
    queue::{Queue, QueueId},
};

/// Outcome of a single poll cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Worker {
    queue: Queue,
    tokens: Arc<dyn TokenProvider>,
    mailer: Arc<dyn Mailer>,
    poll_interval: Duration,
    failed: u64,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("queue", &self.queue)
            .field("poll_interval", &self.poll_interval)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl Worker {
    #[must_use]
    pub fn new(
        queue: Queue,
        tokens: Arc<dyn TokenProvider>,
        mailer: Arc<dyn Mailer>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            tokens,
            mailer,
            poll_interval,
            failed: 0,
        }
    }

    /// Total failed delivery attempts since the worker started
    #[must_use]
    pub const fn failed(&self) -> u64 {
        self.failed
    }

    /// Run one poll cycle without sleeping.
    ///
    /// # Errors
    /// If no token can be obtained or the queue cannot be listed; in both
    /// cases no message has been attempted.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let token = self.tokens.access_token().await?;
        let ids = self.queue.list().await?;
        let mut report = CycleReport::default();

        for id in ids {
            match self.deliver_one(&id, &token).await {
                Ok(()) => {
                    report.delivered += 1;
                    internal!(level = INFO, "Sent queued mail {}", id.filename());
                }
                Err(e) => {
                    report.failed += 1;
                    self.failed += 1;
                    tracing::error!("Failed to send {}: {e}", id.filename());
                }
            }
        }

        Ok(report)
    }

    /// Parse, deliver, then remove a single queued message.
    async fn deliver_one(&self, id: &QueueId, token: &str) -> Result<()> {
        let raw = self.queue.read(id).await?;
        let message = ParsedMessage::parse(&raw)?;
        self.mailer.deliver(&message, token).await?;
        self.queue.remove(id).await
    }

    /// Poll until a shutdown signal arrives.
    ///
    /// Shutdown is only observed before a cycle starts and while sleeping; a
    /// delivery in flight always runs to completion.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(
            level = INFO,
            "Worker polling {} every {}s",
            self.queue.path().display(),
            self.poll_interval.as_secs()
        );

        loop {
            match shutdown.try_recv() {
                Ok(_) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Empty | TryRecvError::Lagged(_)) => {}
            }

            match self.run_cycle().await {
                Ok(report) if report != CycleReport::default() => {
                    internal!(
                        level = INFO,
                        "Cycle finished: {} sent, {} failed ({} failures since start)",
                        report.delivered,
                        report.failed,
                        self.failed
                    );
                }
                Ok(_) => internal!(level = DEBUG, "Queue empty"),
                Err(e) => tracing::error!("Poll cycle aborted: {e}"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        internal!(level = INFO, "Worker stopped");
    }
}
