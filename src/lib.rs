//! azkit - Azure resource modules
//!
//! Lazily cached, refreshable views of Azure subscriptions, resource groups
//! and resource providers, on top of Azure Resource Manager.

pub mod azure;
pub mod config;
pub mod error;
pub mod resource;

pub use error::{Error, Result};
