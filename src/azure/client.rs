//! Azure Resource Manager client
//!
//! Combines a token credential with the shared HTTP transport for one
//! subscription's worth of ARM calls.

use super::auth::TokenCredential;
use super::environment::AzureEnvironment;
use super::http::AzHttpClient;
use crate::error::{Error, Result};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// api-version for resource groups and providers
pub const RESOURCES_API_VERSION: &str = "2021-04-01";

/// api-version for subscription locations
pub const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";

/// Upper bound on `nextLink` hops for one listing
const MAX_PAGES: usize = 200;

/// Provider state polls after a registration request
const REGISTRATION_POLLS: usize = 24;
const REGISTRATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    credential: Arc<dyn TokenCredential>,
    http: Arc<AzHttpClient>,
    environment: AzureEnvironment,
    base_url: String,
}

impl ArmClient {
    pub fn new(
        http: Arc<AzHttpClient>,
        credential: Arc<dyn TokenCredential>,
        environment: AzureEnvironment,
    ) -> Self {
        Self {
            credential,
            http,
            environment,
            base_url: environment.management_endpoint().to_string(),
        }
    }

    /// Point the client at another endpoint (sovereign proxies, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Make a GET request to an ARM API
    ///
    /// A subscription that has not registered the provider namespace gets
    /// it registered, then the request is sent once more.
    pub async fn get(&self, url: &str) -> Result<Value> {
        match self.send(Method::GET, url).await {
            Err(Error::ProviderNotRegistered { namespace }) => match subscription_of(url) {
                Some(subscription_id) => {
                    self.register_provider(&subscription_id, &namespace).await?;
                    self.send(Method::GET, url).await
                }
                None => Err(Error::ProviderNotRegistered { namespace }),
            },
            other => other,
        }
    }

    /// Register a resource provider namespace and wait until it is usable
    #[tracing::instrument(name = "provider.register", skip(self))]
    pub async fn register_provider(&self, subscription_id: &str, namespace: &str) -> Result<()> {
        tracing::info!("Registering {} in subscription {}", namespace, subscription_id);
        let register_url = self.subscription_url(
            subscription_id,
            &format!("providers/{}/register", urlencoding::encode(namespace)),
            RESOURCES_API_VERSION,
        );
        let mut provider = self.send(Method::POST, &register_url).await?;
        let provider_url = self.provider_url(subscription_id, namespace);

        for _ in 0..REGISTRATION_POLLS {
            let state = provider
                .get("registrationState")
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            if state.eq_ignore_ascii_case("Registered") {
                tracing::info!("{} is registered", namespace);
                return Ok(());
            }
            tracing::debug!("{} registration state: {}", namespace, state);
            tokio::time::sleep(REGISTRATION_POLL_INTERVAL).await;
            provider = self.send(Method::GET, &provider_url).await?;
        }

        Err(Error::fetch(
            namespace,
            format!("registration did not complete after {} polls", REGISTRATION_POLLS),
        ))
    }

    /// Authorized request; a rejected token is refreshed and tried once more
    async fn send(&self, method: Method, url: &str) -> Result<Value> {
        let scope = self.environment.management_scope();
        let token = self.credential.get_token(&scope).await?;
        match self.call(&method, url, &token.token).await {
            Err(Error::Authentication(reason)) => {
                tracing::debug!("Request rejected ({}), retrying with a new token", reason);
                let token = self.credential.refresh_token(&scope).await?;
                self.call(&method, url, &token.token).await
            }
            other => other,
        }
    }

    async fn call(&self, method: &Method, url: &str, token: &str) -> Result<Value> {
        if *method == Method::POST {
            self.http.post(url, token).await
        } else {
            self.http.get(url, token).await
        }
    }

    /// GET a collection and follow `nextLink` until exhausted
    pub async fn get_all(&self, url: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut pages = 0;

        while let Some(current) = next.take() {
            let response = self.get(&current).await?;
            if let Some(page) = response.get("value").and_then(|v| v.as_array()) {
                items.extend(page.iter().cloned());
            }

            pages += 1;
            if pages >= MAX_PAGES {
                tracing::warn!("Stopped following nextLink after {} pages", pages);
                break;
            }

            next = response
                .get("nextLink")
                .and_then(|v| v.as_str())
                .filter(|link| !link.is_empty() && *link != current)
                .map(|s| s.to_string());
        }

        Ok(items)
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build an ARM URL from a path and api-version
    pub fn management_url(&self, path: &str, api_version: &str) -> String {
        format!(
            "{}/{}?api-version={}",
            self.base_url,
            path.trim_start_matches('/'),
            api_version
        )
    }

    /// Build a subscription-scoped ARM URL
    pub fn subscription_url(&self, subscription_id: &str, path: &str, api_version: &str) -> String {
        let path = path.trim_start_matches('/');
        let full = if path.is_empty() {
            format!("subscriptions/{}", urlencoding::encode(subscription_id))
        } else {
            format!("subscriptions/{}/{}", urlencoding::encode(subscription_id), path)
        };
        self.management_url(&full, api_version)
    }

    pub fn locations_url(&self, subscription_id: &str) -> String {
        self.subscription_url(subscription_id, "locations", SUBSCRIPTIONS_API_VERSION)
    }

    pub fn resource_groups_url(&self, subscription_id: &str) -> String {
        self.subscription_url(subscription_id, "resourcegroups", RESOURCES_API_VERSION)
    }

    pub fn resource_group_url(&self, subscription_id: &str, resource_group: &str) -> String {
        self.subscription_url(
            subscription_id,
            &format!("resourcegroups/{}", urlencoding::encode(resource_group)),
            RESOURCES_API_VERSION,
        )
    }

    pub fn provider_url(&self, subscription_id: &str, namespace: &str) -> String {
        self.subscription_url(
            subscription_id,
            &format!("providers/{}", urlencoding::encode(namespace)),
            RESOURCES_API_VERSION,
        )
    }
}

/// Subscription id in an ARM URL path, if any
fn subscription_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    segments.find(|s| s.eq_ignore_ascii_case("subscriptions"))?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
}
