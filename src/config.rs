//! Runtime configuration.
//!
//! Loaded once at startup and passed by reference to everything that needs it.
//!
//! ```toml
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! client_secret = "..."
//! sender = "noreply@example.com"
//! queue_dir = "/var/spool/mailrelay"
//! log_dir = "/var/log/mailrelay"
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "MAILRELAY_CONFIG";

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_endpoint() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_scope() -> String {
    "https://graph.microsoft.com/.default".to_string()
}

const fn default_poll_interval() -> u64 {
    10
}

const fn default_http_timeout() -> u64 {
    30
}

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("mail_worker.pid")
}

fn default_token_cache() -> PathBuf {
    std::env::temp_dir().join("msal_token_cache.json")
}

#[derive(Clone, Deserialize)]
pub struct Config {
    /// Directory tenant the application is registered in
    #[serde(default)]
    pub tenant_id: String,

    /// Application (client) id
    #[serde(default)]
    pub client_id: String,

    /// Application secret used for the client-credentials exchange
    #[serde(default)]
    pub client_secret: String,

    /// Mailbox the messages are sent as
    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub queue_dir: PathBuf,

    #[serde(default)]
    pub log_dir: PathBuf,

    /// Base URL of the identity provider
    #[serde(default = "default_authority_host")]
    pub authority_host: String,

    /// Base URL of the mail API
    #[serde(default = "default_graph_endpoint")]
    pub graph_endpoint: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    /// Sleep between poll cycles (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Timeout for each HTTP request (in seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    #[serde(default = "default_token_cache")]
    pub token_cache: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            sender: String::new(),
            queue_dir: PathBuf::new(),
            log_dir: PathBuf::new(),
            authority_host: default_authority_host(),
            graph_endpoint: default_graph_endpoint(),
            scope: default_scope(),
            poll_interval_secs: default_poll_interval(),
            http_timeout_secs: default_http_timeout(),
            lock_file: default_lock_file(),
            token_cache: default_token_cache(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("sender", &self.sender)
            .field("queue_dir", &self.queue_dir)
            .field("log_dir", &self.log_dir)
            .field("authority_host", &self.authority_host)
            .field("graph_endpoint", &self.graph_endpoint)
            .field("scope", &self.scope)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("lock_file", &self.lock_file)
            .field("token_cache", &self.token_cache)
            .finish()
    }
}

impl Config {
    /// Load the configuration from `explicit`, or the first config file found,
    /// then apply environment overrides.
    ///
    /// The result is not validated, since the enqueuer and the worker need
    /// different subsets; call [`Config::validate`] or
    /// [`Config::validate_queue`].
    ///
    /// # Errors
    /// If the file cannot be read or parsed
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file()?,
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Parse a config file without applying overrides or validating.
    ///
    /// # Errors
    /// If the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content)
    }

    /// # Errors
    /// If `content` is not valid TOML for this struct
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Replace settings with values from the environment, where present.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let strings = [
            ("TENANT_ID", &mut self.tenant_id),
            ("CLIENT_ID", &mut self.client_id),
            ("CLIENT_SECRET", &mut self.client_secret),
            ("SENDER", &mut self.sender),
        ];
        for (key, field) in strings {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = value;
            }
        }

        let paths = [
            ("QUEUE_DIR", &mut self.queue_dir),
            ("LOG_DIR", &mut self.log_dir),
        ];
        for (key, field) in paths {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = PathBuf::from(value);
            }
        }
    }

    /// Check the settings the enqueuer needs.
    ///
    /// # Errors
    /// If the queue or log directory is unset
    pub fn validate_queue(&self) -> Result<(), ConfigError> {
        if self.queue_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("queue_dir"));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("log_dir"));
        }

        Ok(())
    }

    /// Check every setting the worker needs.
    ///
    /// # Errors
    /// If a required setting is empty or a value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("tenant_id", self.tenant_id.is_empty()),
            ("client_id", self.client_id.is_empty()),
            ("client_secret", self.client_secret.is_empty()),
            ("sender", self.sender.is_empty()),
        ];
        if let Some((field, _)) = required.into_iter().find(|(_, empty)| *empty) {
            return Err(ConfigError::Missing(field));
        }

        self.validate_queue()?;

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        for (field, url) in [
            ("authority_host", &self.authority_host),
            ("graph_endpoint", &self.graph_endpoint),
        ] {
            reqwest::Url::parse(url).map_err(|e| ConfigError::Invalid {
                field,
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Token endpoint for the configured tenant
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Send endpoint for the configured sender
    #[must_use]
    pub fn send_mail_url(&self) -> String {
        format!(
            "{}/users/{}/sendMail",
            self.graph_endpoint.trim_end_matches('/'),
            self.sender
        )
    }
}

/// Find the configuration file using the following precedence:
/// 1. `MAILRELAY_CONFIG` environment variable
/// 2. /etc/mailrelay/mailrelay.toml (system-wide config)
/// 3. ./mailrelay.toml (current working directory)
///
/// Returns `None` when no file exists, in which case the environment alone
/// has to supply every setting.
fn find_config_file() -> Result<Option<PathBuf>, ConfigError> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::NotFound(format!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        )));
    }

    let default_paths = [
        PathBuf::from("/etc/mailrelay/mailrelay.toml"),
        PathBuf::from("./mailrelay.toml"),
    ];

    Ok(default_paths.into_iter().find(|path| path.exists()))
}
