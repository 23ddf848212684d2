//! Service-scoped subscription root
//!
//! Region capability lookups for one service inside one subscription.

use super::identity::service_resource_id;
use crate::azure::account::Account;
use crate::azure::context::AzureContext;
use crate::azure::region::Region;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Resource type declared by a provider, e.g. `sites` under `Microsoft.Web`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResourceType {
    pub resource_type: String,
    /// Display names, e.g. `East US`
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub api_versions: Vec<String>,
}

/// Source of provider metadata
#[async_trait]
pub trait ProviderCatalog: Send + Sync {
    async fn resource_types(
        &self,
        subscription_id: &str,
        namespace: &str,
    ) -> Result<Vec<ProviderResourceType>>;
}

/// Provider metadata from `GET /subscriptions/{id}/providers/{namespace}`
pub struct ArmProviderCatalog {
    context: AzureContext,
}

impl ArmProviderCatalog {
    pub fn new(context: AzureContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ProviderCatalog for ArmProviderCatalog {
    async fn resource_types(
        &self,
        subscription_id: &str,
        namespace: &str,
    ) -> Result<Vec<ProviderResourceType>> {
        let client = self.context.arm_client(subscription_id)?;
        let response = client
            .get(&client.provider_url(subscription_id, namespace))
            .await?;

        let types = response
            .get("resourceTypes")
            .cloned()
            .map(serde_json::from_value::<Vec<ProviderResourceType>>)
            .transpose()
            .map_err(|e| Error::fetch_with_source(namespace, "unexpected provider payload", e))?
            .unwrap_or_default();

        tracing::debug!("{} declares {} resource types", namespace, types.len());
        Ok(types)
    }
}

pub struct ServiceSubscription {
    service: String,
    subscription_id: String,
    account: Arc<dyn Account>,
    catalog: Arc<dyn ProviderCatalog>,
}

impl ServiceSubscription {
    pub fn new(
        service: &str,
        subscription_id: &str,
        account: Arc<dyn Account>,
        catalog: Arc<dyn ProviderCatalog>,
    ) -> Self {
        Self {
            service: service.to_string(),
            subscription_id: subscription_id.to_string(),
            account,
            catalog,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn id(&self) -> String {
        service_resource_id(&self.service, &self.subscription_id, None)
    }

    /// Regions where `resource_type` can be deployed in this subscription
    ///
    /// Locations declared by the provider for the type (matched ignoring
    /// case) that the subscription can use, in the provider's order. Falls
    /// back to every region available to the subscription, in its original
    /// order, when the type is unknown or nothing intersects.
    #[tracing::instrument(
        name = "service.list_supported_regions",
        skip(self),
        fields(service = %self.service, subscription = %self.subscription_id)
    )]
    pub async fn list_supported_regions(&self, resource_type: &str) -> Result<Vec<Region>> {
        let available = self.account.list_regions(&self.subscription_id).await?;
        let declared = self
            .catalog
            .resource_types(&self.subscription_id, &self.service)
            .await?;

        let mut supported: Vec<Region> = Vec::new();
        if let Some(found) = declared
            .iter()
            .find(|t| t.resource_type.eq_ignore_ascii_case(resource_type))
        {
            for location in &found.locations {
                let region = Region::from_name(location);
                if let Some(known) = available.iter().find(|r| **r == region) {
                    if !supported.contains(known) {
                        supported.push(known.clone());
                    }
                }
            }
        } else {
            tracing::debug!("{} does not declare type {}", self.service, resource_type);
        }

        if supported.is_empty() {
            return Ok(available);
        }
        Ok(supported)
    }
}
