//! OAuth2 client-credentials token acquisition with an on-disk cache.

mod cache;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::Deserialize;

pub use cache::{CachedToken, TokenCache};

use crate::{config::Config, error::AuthError, internal, outgoing};

/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Source of bearer tokens for the delivery client
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a usable access token.
    ///
    /// # Errors
    /// If no token can be obtained
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Token endpoint response, success and error shapes combined
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Client-credentials provider backed by a persistent [`TokenCache`]
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cache_path: PathBuf,
}

impl CredentialProvider {
    #[must_use]
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
            cache_path: config.token_cache.clone(),
        }
    }

    /// Perform the client-credentials exchange against the identity provider.
    async fn exchange(&self) -> Result<CachedToken, AuthError> {
        outgoing!(level = DEBUG, "Requesting token from {}", self.token_url);

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::InvalidResponse {
                status,
                reason: e.to_string(),
            })?;

        let Some(access_token) = parsed.access_token else {
            return Err(AuthError::Rejected(
                parsed
                    .error_description
                    .or(parsed.error)
                    .unwrap_or_else(|| format!("no access token in response (HTTP {status})")),
            ));
        };

        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let expires_at = TimeDelta::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| AuthError::InvalidResponse {
                status,
                reason: format!("expires_in out of range: {expires_in}"),
            })?;

        outgoing!(level = INFO, "Obtained new access token");

        Ok(CachedToken {
            client_id: self.client_id.clone(),
            scope: self.scope.clone(),
            access_token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for CredentialProvider {
    /// Silent acquisition from the cache first, then a full exchange.
    ///
    /// The cache is reloaded on every call and only written back when it
    /// changed. A failed write is logged; the token is still returned.
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cache = TokenCache::load(&self.cache_path).await;
        let now = Utc::now();

        if let Some(token) = cache.find(&self.client_id, &self.scope, now) {
            internal!(level = DEBUG, "Using cached access token");
            return Ok(token.access_token.clone());
        }

        let token = self.exchange().await?;
        let access_token = token.access_token.clone();
        cache.insert(token, now);

        if cache.has_state_changed()
            && let Err(e) = cache.save(&self.cache_path).await
        {
            tracing::warn!(
                "Unable to persist token cache {}: {e}",
                self.cache_path.display()
            );
        }

        Ok(access_token)
    }
}
