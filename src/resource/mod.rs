//! Resource abstraction layer
//!
//! This module models Azure's resource graph as a tree of lazily populated
//! caches. A [`ResourceModule`] owns the children of one parent scope; a
//! [`Service`] is the root module of a provider namespace, with one child per
//! selected subscription.
//!
//! # Architecture
//!
//! - [`identity`] - Canonical resource ids and cache keys
//! - [`module`] - The per-scope cache (`get`, `list`, `refresh`)
//! - [`entry`] - A cached resource: identity, payload, status
//! - [`service`] - Root modules that fan out across subscriptions
//! - [`subscription`] - Per-subscription region capability lookups
//! - [`groups`] / [`providers`] - Concrete modules over ARM
//!
//! # Example
//!
//! ```ignore
//! use azkit::resource::providers::provider_service;
//!
//! async fn web_regions(context: AzureContext) -> azkit::Result<()> {
//!     let web = provider_service("Microsoft.Web", context);
//!     for subscription in web.list().await? {
//!         let regions = web.subscription(subscription.name()).list_supported_regions("sites").await?;
//!         println!("{}: {} regions", subscription.name(), regions.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod entry;
pub mod groups;
pub mod identity;
pub mod module;
pub mod providers;
pub mod service;
pub mod status;
pub mod subscription;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use entry::Resource;
pub use identity::{ResourceId, Scope, RESOURCE_GROUP_PLACEHOLDER};
pub use module::ResourceModule;
pub use service::{Service, SubscriptionLoader};
pub use status::Status;
pub use subscription::{ProviderCatalog, ProviderResourceType, ServiceSubscription};
pub use traits::{Cacheable, Discovered, RemoteLoadable, Refreshable};
