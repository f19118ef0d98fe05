use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{internal, persist};

/// Tokens this close to expiry are not handed out from the cache
fn expiry_margin() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub client_id: String,
    pub scope: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Whether the token can still be used at `now`
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(expiry_margin())
            .is_some_and(|usable_until| usable_until > now)
    }
}

/// Serializable token cache shared by every worker run on the host.
///
/// The on-disk form is JSON. Only the credential provider reads it.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TokenCache {
    #[serde(default)]
    tokens: Vec<CachedToken>,
    #[serde(skip)]
    changed: bool,
}

impl TokenCache {
    /// Load the cache from `path`.
    ///
    /// A missing file yields an empty cache. So does a corrupt one, which is
    /// logged and will be overwritten on the next successful exchange.
    pub async fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("Unable to read token cache {}: {e}", path.display());
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Discarding corrupt token cache {}: {e}", path.display());
            Self::default()
        })
    }

    /// Write the cache atomically, readable by the owner only, and clear the
    /// changed flag.
    ///
    /// # Errors
    /// If the cache file cannot be written
    pub async fn save(&mut self, path: &Path) -> std::io::Result<()> {
        let serialized = serde_json::to_vec(self)?;
        let target = path.to_path_buf();

        tokio::task::spawn_blocking(move || persist::write_private(&target, &serialized))
            .await
            .map_err(std::io::Error::other)??;

        self.changed = false;
        internal!(level = DEBUG, "Token cache written to {}", path.display());

        Ok(())
    }

    /// Silent acquisition: a usable token for this client and scope
    #[must_use]
    pub fn find(&self, client_id: &str, scope: &str, now: DateTime<Utc>) -> Option<&CachedToken> {
        self.tokens
            .iter()
            .find(|t| t.client_id == client_id && t.scope == scope && t.is_usable(now))
    }

    /// Store a token, replacing any for the same client and scope and
    /// dropping expired entries.
    pub fn insert(&mut self, token: CachedToken, now: DateTime<Utc>) {
        self.tokens.retain(|t| {
            !(t.client_id == token.client_id && t.scope == token.scope) && t.expires_at > now
        });
        self.tokens.push(token);
        self.changed = true;
    }

    #[must_use]
    pub const fn has_state_changed(&self) -> bool {
        self.changed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
