//! Azure Authentication
//!
//! Token credentials used to authorize Resource Manager calls. No interactive
//! flow lives here: tokens either come from the Azure CLI session left by
//! `az login`, or are handed in directly.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 60;

const AZ_PROGRAM: &str = if cfg!(windows) { "az.cmd" } else { "az" };

/// A bearer token and the instant it stops being usable
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Check if this token is still valid (with buffer applied)
    pub fn is_valid(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(TOKEN_EXPIRY_BUFFER_SECS) < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens for one subscription
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Token for the given audience, e.g. `https://management.azure.com/`
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;

    /// Token for the scope, bypassing any cache; called after a rejection
    async fn refresh_token(&self, scope: &str) -> Result<AccessToken> {
        self.get_token(scope).await
    }
}

/// Fixed token, e.g. from `AZURE_ACCESS_TOKEN`
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("AZURE_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        Ok(AccessToken::new(
            self.token.clone(),
            Utc::now() + ChronoDuration::seconds(DEFAULT_TOKEN_TTL_SECS),
        ))
    }
}

/// Output of `az account get-access-token --output json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    /// Unix timestamp, present in CLI >= 2.54
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

impl CliTokenResponse {
    fn expiry(&self) -> DateTime<Utc> {
        if let Some(ts) = self.expires_on_unix.and_then(|s| DateTime::from_timestamp(s, 0)) {
            return ts;
        }
        // Older CLIs write local time without offset
        self.expires_on
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() + ChronoDuration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }
}

/// Tokens from the Azure CLI session, cached per scope until near expiry
#[derive(Clone)]
pub struct AzureCliCredential {
    subscription_id: Option<String>,
    token_cache: Arc<RwLock<HashMap<String, AccessToken>>>,
}

impl AzureCliCredential {
    pub fn new(subscription_id: Option<&str>) -> Self {
        Self {
            subscription_id: subscription_id.map(str::to_string),
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken> {
        let mut command = Command::new(AZ_PROGRAM);
        command
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(scope);
        if let Some(subscription) = &self.subscription_id {
            command.args(["--subscription", subscription]);
        }

        let output = command.output().await.map_err(|e| {
            Error::Authentication(format!("Azure CLI is not available ({}). Install it and run 'az login'", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Security: first line only, the rest may echo tenant details
            let first_line = stderr.lines().next().unwrap_or("").trim();
            tracing::error!("az account get-access-token failed: {}", first_line);
            return Err(Error::Authentication(
                "Azure CLI could not provide a token. Run 'az login'".to_string(),
            ));
        }

        let response: CliTokenResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Authentication(format!("unexpected Azure CLI output: {}", e)))?;
        let expires_at = response.expiry();
        Ok(AccessToken::new(response.access_token, expires_at))
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        // Check cache first - but only return if token is still valid
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.get(scope) {
                if cached.is_valid() {
                    return Ok(cached.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self.request_token(scope).await?;

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(scope.to_string(), token.clone());
        }

        tracing::debug!(
            "New token cached, expires at {}",
            token.expires_at.format("%H:%M:%S")
        );

        Ok(token)
    }

    /// Force refresh the token for a scope
    async fn refresh_token(&self, scope: &str) -> Result<AccessToken> {
        {
            let mut cache = self.token_cache.write().await;
            cache.remove(scope);
        }

        self.get_token(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validity_uses_buffer() {
        let almost = AccessToken::new("t", Utc::now() + ChronoDuration::seconds(30));
        assert!(!almost.is_valid());

        let fresh = AccessToken::new("t", Utc::now() + ChronoDuration::minutes(10));
        assert!(fresh.is_valid());
    }

    #[test]
    fn test_cli_response_prefers_unix_expiry() {
        let response: CliTokenResponse = serde_json::from_str(
            r#"{"accessToken":"abc","expiresOn":"2001-01-01 00:00:00.000000","expires_on":1900000000,"tokenType":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(response.expiry().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_cli_response_parses_local_expiry() {
        let response: CliTokenResponse = serde_json::from_str(
            r#"{"accessToken":"abc","expiresOn":"2099-06-01 12:30:00.000000"}"#,
        )
        .unwrap();
        assert!(response.expiry() > Utc::now());
    }

    #[test]
    fn test_debug_masks_token() {
        let token = AccessToken::new("super-secret", Utc::now());
        assert!(!format!("{:?}", token).contains("super-secret"));
    }

    #[tokio::test]
    async fn test_static_credential_returns_token() {
        let credential = StaticTokenCredential::new("fixed");
        let token = credential.get_token("https://management.azure.com/").await.unwrap();
        assert_eq!(token.token, "fixed");
        assert!(token.is_valid());
    }
}
