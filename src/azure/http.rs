//! HTTP utilities for Azure REST API calls
//!
//! [`HttpClientProvider`] owns the one transport client shared by every
//! resource module in the process. It is built on first use from the
//! configuration snapshot taken at that moment.

use crate::config::{AzureConfiguration, ConfigHandle, HttpLogLevel};
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for Azure API calls
#[derive(Clone)]
pub struct AzHttpClient {
    client: Client,
    log_level: HttpLogLevel,
}

impl AzHttpClient {
    /// Build a client from a configuration snapshot
    pub fn from_config(config: &AzureConfiguration) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder().user_agent(config.user_agent.clone());

        if let Some(proxy) = config.proxy.as_ref().filter(|p| p.is_active()) {
            tracing::debug!("Using proxy {}:{} (source: {})", proxy.host, proxy.port, proxy.source);
            let mut reqwest_proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| Error::Configuration(format!("invalid proxy: {}", e)))?;
            if let Some((user, password)) = proxy.credentials() {
                reqwest_proxy = reqwest_proxy.basic_auth(user, password);
            }
            builder = builder.proxy(reqwest_proxy);
        }

        if let Some(path) = &config.ca_certificate {
            let pem = std::fs::read(path).map_err(|e| {
                Error::Configuration(format!("cannot read CA certificate {:?}: {}", path, e))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Configuration(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            log_level: config.log_level,
        })
    }

    /// Make a GET request to an Azure API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        self.send(reqwest::Method::GET, url, token).await
    }

    /// Make a POST request with an empty body
    pub async fn post(&self, url: &str, token: &str) -> Result<Value> {
        self.send(reqwest::Method::POST, url, token).await
    }

    async fn send(&self, method: reqwest::Method, url: &str, token: &str) -> Result<Value> {
        let request_id = uuid::Uuid::new_v4();
        if self.log_level.logs_requests() {
            tracing::debug!("{} {} (request id {})", method, url, request_id);
        }

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header("x-ms-client-request-id", request_id.to_string());
        if method == reqwest::Method::POST {
            // ARM rejects a bodiless POST without a length (411)
            request = request.header(reqwest::header::CONTENT_LENGTH, 0);
        }

        let response = request.send().await?;

        let status = response.status();
        if self.log_level.logs_headers() {
            tracing::debug!("Response {} headers: {:?}", status, response.headers());
        }

        let body = response.text().await?;

        if self.log_level.logs_bodies() {
            tracing::trace!("Response body: {}", sanitize_for_log(&body));
        }

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            if status == reqwest::StatusCode::CONFLICT {
                if let Some(namespace) = missing_registration_namespace(&body) {
                    return Err(Error::ProviderNotRegistered { namespace });
                }
            }
            return Err(Error::from_status(status.as_u16(), resource_path(url)));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Namespace named by a `MissingSubscriptionRegistration` error body
fn missing_registration_namespace(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let code = error.get("code")?.as_str()?;
    if !code.eq_ignore_ascii_case("MissingSubscriptionRegistration") {
        return None;
    }
    let message = error.get("message")?.as_str()?;
    let start = message.find("namespace '")? + "namespace '".len();
    let len = message[start..].find('\'')?;
    Some(message[start..start + len].to_string())
}

/// Path part of a URL, used to name the resource in errors
fn resource_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

/// Construct-once holder of the shared [`AzHttpClient`]
///
/// Concurrent first callers race on a lock inside the cell; exactly one of
/// them builds the client and every caller gets the same instance. A failed
/// build leaves the cell empty so the next call retries.
pub struct HttpClientProvider {
    config: ConfigHandle,
    client: OnceCell<Arc<AzHttpClient>>,
}

impl HttpClientProvider {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    /// The shared client, built on first call
    pub fn get(&self) -> Result<Arc<AzHttpClient>> {
        self.client
            .get_or_try_init(|| {
                let snapshot = self.config.snapshot();
                tracing::debug!("Building shared HTTP client (user agent: {})", snapshot.user_agent);
                AzHttpClient::from_config(&snapshot).map(Arc::new)
            })
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }
}
