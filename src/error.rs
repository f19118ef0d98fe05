//! Error types for the relay.
//!
//! The categories follow how a failure is isolated at runtime:
//! - [`RelayError::Auth`] abandons the current poll cycle only
//! - [`RelayError::Delivery`] and [`RelayError::Parse`] are counted per message
//!   and leave the queue file in place for the next cycle
//! - [`RelayError::Filesystem`] and [`RelayError::Config`] are fatal when they
//!   happen at startup or during a one-shot enqueue

use std::{io, path::PathBuf};

use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Queue, lock, or cache file could not be read or written.
    #[error("Filesystem error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The identity provider did not hand out a token.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The remote mail API refused the message.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// A queued message could not be parsed.
    #[error("Malformed message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    /// Attach the offending path to an I/O error.
    pub fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Token acquisition errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint answered without an access token.
    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),

    /// The token endpoint could not be reached.
    #[error("Token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The token endpoint answered with something other than a token response.
    #[error("Unexpected token response (HTTP {status}): {reason}")]
    InvalidResponse { status: u16, reason: String },
}

/// Remote send errors.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The API answered with a non-success status.
    #[error("Remote API returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request never completed.
    #[error("Send request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Configuration errors, all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration found: {0}")]
    NotFound(String),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting `{0}`")]
    Missing(&'static str),

    #[error("Invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Specialized `Result` type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
