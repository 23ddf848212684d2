//! Azure Context
//!
//! Everything a resource module needs from the outside world, bundled so it
//! can be passed into constructors instead of looked up globally.

use super::account::{Account, CliProfileAccount};
use super::client::ArmClient;
use super::http::HttpClientProvider;
use crate::config::ConfigHandle;
use crate::error::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct AzureContext {
    pub config: ConfigHandle,
    pub account: Arc<dyn Account>,
    pub http: Arc<HttpClientProvider>,
    base_url: Option<String>,
}

impl AzureContext {
    pub fn new(config: ConfigHandle, account: Arc<dyn Account>, http: Arc<HttpClientProvider>) -> Self {
        Self {
            config,
            account,
            http,
            base_url: None,
        }
    }

    /// Context over the Azure CLI profile on this machine
    pub fn from_cli_profile(config: ConfigHandle) -> Result<Self> {
        let http = Arc::new(HttpClientProvider::new(config.clone()));
        let selection = config.snapshot().selected_subscriptions;
        let account = CliProfileAccount::load(selection, http.clone())?;
        Ok(Self::new(config, Arc::new(account), http))
    }

    /// Route ARM calls made through this context to another endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    /// ARM client for one subscription, on the shared transport
    pub fn arm_client(&self, subscription_id: &str) -> Result<ArmClient> {
        let client = ArmClient::new(
            self.http.get()?,
            self.account.token_credential(subscription_id)?,
            self.account.environment(),
        );
        Ok(match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.config.snapshot().max_concurrent_subscriptions.max(1)
    }
}
