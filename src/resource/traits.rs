//! Capabilities shared by resources and modules
//!
//! A concrete resource type plugs into the cache by implementing
//! [`RemoteLoadable`]; the cache itself provides [`Refreshable`] and
//! [`Cacheable`].

use crate::error::Result;
use async_trait::async_trait;

/// One resource found by a listing, or the reason it could not be read
pub struct Discovered<R> {
    pub name: String,
    pub resource_group: Option<String>,
    pub remote: Result<R>,
}

impl<R> Discovered<R> {
    pub fn ok(name: impl Into<String>, resource_group: Option<&str>, remote: R) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.map(str::to_string),
            remote: Ok(remote),
        }
    }

    pub fn failed(name: impl Into<String>, resource_group: Option<&str>, error: crate::Error) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.map(str::to_string),
            remote: Err(error),
        }
    }
}

/// Fetches remote payloads for one module
#[async_trait]
pub trait RemoteLoadable<R>: Send + Sync {
    /// Everything the module's parent currently holds
    ///
    /// An `Err` here aborts the listing; failures of single resources belong
    /// in [`Discovered::remote`].
    async fn load_resources(&self) -> Result<Vec<Discovered<R>>>;

    /// One resource; `Ok(None)` when it does not exist remotely
    async fn load_resource(&self, name: &str, resource_group: Option<&str>) -> Result<Option<R>>;

    /// Provider-specific state text shown alongside an OK status
    fn load_status(&self, _remote: &R) -> Option<String> {
        None
    }

    /// Canonical id, when the module's default format does not apply
    fn resource_id(&self, _name: &str, _resource_group: Option<&str>) -> Option<String> {
        None
    }
}

/// Drop cached remote state so the next access re-fetches
pub trait Refreshable {
    fn refresh(&self);
}

pub trait Cacheable {
    /// Whether a fetch has completed since the last refresh
    fn is_loaded(&self) -> bool;

    /// Evict everything cached
    fn clear_cache(&self);
}
