//! Error types
//!
//! Every failure the resource layer can observe falls in one of four classes:
//! a missing resource, a fetch that failed for one resource only, a broken
//! configuration, or a missing/invalid session. Only the last two abort a
//! batch operation; the others are captured on the affected resource.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for azkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for azkit
#[derive(Error, Debug)]
pub enum Error {
    /// Requested resource or subscription does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// What was looked up (resource type, "subscription", ...)
        kind: String,
        /// Name or id that was looked up
        name: String,
    },

    /// Fetching a single resource failed; siblings are unaffected
    #[error("Failed to fetch '{resource}': {message}")]
    TransientFetch {
        resource: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed proxy, TLS or other process-wide configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No valid account or session
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The subscription has not registered the resource provider namespace
    #[error("Subscription is not registered to use namespace '{namespace}'")]
    ProviderNotRegistered { namespace: String },

    /// A resource was used while its cached status carries a failure
    #[error("Resource '{id}' is unavailable: {cause}")]
    Unavailable {
        id: String,
        #[source]
        cause: Arc<Error>,
    },
}

impl Error {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn fetch(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientFetch {
            resource: resource.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn fetch_with_source<E>(resource: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TransientFetch {
            resource: resource.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Map a non-success HTTP status onto the taxonomy
    pub fn from_status(status: u16, resource: impl Into<String>) -> Self {
        let resource = resource.into();
        match status {
            401 => Self::Authentication(format!("request for '{}' was not authorized (401)", resource)),
            403 => Self::Authentication(format!("access to '{}' was denied (403)", resource)),
            404 => Self::not_found("resource", resource),
            _ => Self::fetch(resource, format!("API request failed: {}", status)),
        }
    }

    /// Errors with no safe continuation; batch operations stop on these
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::Authentication(_) => true,
            Self::Unavailable { cause, .. } => cause.is_fatal(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Unavailable { cause, .. } => cause.is_not_found(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let resource = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "-".to_string());
        if err.is_builder() {
            return Self::Configuration(format!("invalid HTTP request: {}", err));
        }
        Self::fetch_with_source(resource, "request failed", err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::fetch_with_source("-", "failed to parse response JSON", err)
    }
}

/// Format an error for display
/// Security: fixed messages per class, raw API bodies never reach the user
pub fn format_azure_error(error: &Error) -> String {
    match error {
        Error::NotFound { kind, name } => format!("{} '{}' not found.", kind, name),
        Error::Authentication(_) => {
            "Authentication failed. Run 'az login' and check your role assignments.".to_string()
        }
        Error::Configuration(msg) => format!("Invalid configuration: {}", msg),
        Error::TransientFetch { message, .. } if message.contains("429") => {
            "Rate limit exceeded. Please try again later.".to_string()
        }
        Error::TransientFetch { message, .. }
            if message.contains("500") || message.contains("503") =>
        {
            "Azure service temporarily unavailable. Please try again.".to_string()
        }
        Error::TransientFetch { .. } => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        Error::ProviderNotRegistered { namespace } => format!(
            "Resource provider '{}' is not registered. Run 'az provider register --namespace {}'.",
            namespace, namespace
        ),
        Error::Unavailable { cause, .. } => format_azure_error(cause),
    }
}
