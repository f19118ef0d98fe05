//! A local outbound mail relay.
//!
//! Messages are dropped into an on-disk queue by [`queue::Queue::enqueue`] and
//! drained by a single long-running [`worker::Worker`], which authenticates with
//! an OAuth2 client-credentials exchange and hands each message to an HTTP mail
//! API. Delivered files are removed; failed files stay put and are retried on
//! the next poll cycle.

pub mod auth;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod lock;
pub mod logging;
pub mod message;
mod persist;
pub mod queue;
pub mod worker;

pub use tracing;

pub use config::Config;
pub use error::{AuthError, ConfigError, DeliveryError, RelayError, Result};
pub use queue::{Queue, QueueId};
pub use worker::{CycleReport, Worker};

/// Lifecycle notifications broadcast to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
