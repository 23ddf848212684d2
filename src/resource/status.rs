//! Resource status

use crate::error::Error;
use std::fmt;
use std::sync::Arc;

/// Cached state of a resource's remote snapshot
#[derive(Debug, Clone, Default)]
pub enum Status {
    /// Never fetched, or invalidated by a refresh
    #[default]
    Unknown,
    /// A fetch is in flight
    Loading,
    /// Payload cached; `detail` is the provider's own state text if any
    Ok { detail: Option<String> },
    /// Last fetch failed
    Error(Arc<Error>),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }

    /// Settled means a fetch completed, successfully or not
    pub fn is_settled(&self) -> bool {
        matches!(self, Status::Ok { .. } | Status::Error(_))
    }

    pub fn error(&self) -> Option<&Arc<Error>> {
        match self {
            Status::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown => f.write_str("Unknown"),
            Status::Loading => f.write_str("Loading"),
            Status::Ok { detail: Some(d) } => f.write_str(d),
            Status::Ok { detail: None } => f.write_str("OK"),
            Status::Error(_) => f.write_str("Error"),
        }
    }
}
