//! Azure API interaction module
//!
//! This module provides the collaborators the resource layer depends on:
//! credentials, the account/subscription context, the shared HTTP
//! transport, and a Resource Manager client.
//!
//! # Module Structure
//!
//! - [`auth`] - Token credentials (Azure CLI session, static token)
//! - [`account`] - Account abstraction and the Azure CLI profile account
//! - [`client`] - ARM client for making API requests
//! - [`context`] - Dependency bundle handed to services
//! - [`environment`] - Azure clouds and their endpoints
//! - [`http`] - HTTP transport and the shared construct-once client
//! - [`region`] - Region value type
//!
//! # Example
//!
//! ```ignore
//! use azkit::azure::context::AzureContext;
//! use azkit::config::{AzureConfiguration, ConfigHandle};
//!
//! async fn example() -> azkit::Result<()> {
//!     let context = AzureContext::from_cli_profile(ConfigHandle::new(AzureConfiguration::load()))?;
//!     let client = context.arm_client("00000000-0000-0000-0000-000000000000")?;
//!     let groups = client.get_all(&client.resource_groups_url("00000000-0000-0000-0000-000000000000")).await?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod auth;
pub mod client;
pub mod context;
pub mod environment;
pub mod http;
pub mod region;
