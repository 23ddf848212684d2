//! Resource provider service
//!
//! One [`Service`] per provider namespace (`Microsoft.Web`,
//! `Microsoft.Storage`, ...). Its per-subscription payload is the provider's
//! registration record.

use super::service::{Service, SubscriptionLoader};
use super::subscription::ProviderResourceType;
use crate::azure::context::AzureContext;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    #[serde(default)]
    pub id: String,
    pub namespace: String,
    #[serde(default)]
    pub registration_state: Option<String>,
    #[serde(default)]
    pub resource_types: Vec<ProviderResourceType>,
}

impl ProviderInfo {
    pub fn is_registered(&self) -> bool {
        self.registration_state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("Registered"))
    }
}

struct ProviderLoader {
    namespace: String,
    context: AzureContext,
}

#[async_trait]
impl SubscriptionLoader<ProviderInfo> for ProviderLoader {
    async fn load_resource_from_azure(
        &self,
        subscription_id: &str,
        _resource_group: Option<&str>,
    ) -> Result<ProviderInfo> {
        let client = self.context.arm_client(subscription_id)?;
        let value = client
            .get(&client.provider_url(subscription_id, &self.namespace))
            .await?;
        serde_json::from_value(value).map_err(|e| {
            Error::fetch_with_source(subscription_id, "unexpected provider payload", e)
        })
    }

    fn load_status(&self, remote: &ProviderInfo) -> Option<String> {
        remote.registration_state.clone()
    }
}

/// Service for one provider namespace across the selected subscriptions
pub fn provider_service(namespace: &str, context: AzureContext) -> Service<ProviderInfo> {
    let loader = ProviderLoader {
        namespace: namespace.to_string(),
        context: context.clone(),
    };
    Service::new(namespace, Arc::new(loader), context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_payload() {
        let info: ProviderInfo = serde_json::from_value(serde_json::json!({
            "id": "/subscriptions/s1/providers/Microsoft.Web",
            "namespace": "Microsoft.Web",
            "registrationState": "Registered",
            "resourceTypes": [
                {"resourceType": "sites", "locations": ["East US", "West Europe"], "apiVersions": ["2023-01-01"]},
                {"resourceType": "serverFarms"}
            ]
        }))
        .unwrap();

        assert!(info.is_registered());
        assert_eq!(info.resource_types.len(), 2);
        assert_eq!(info.resource_types[0].locations, vec!["East US", "West Europe"]);
        assert!(info.resource_types[1].locations.is_empty());
    }

    #[test]
    fn test_unregistered_provider() {
        let info: ProviderInfo = serde_json::from_value(serde_json::json!({
            "namespace": "Microsoft.Quantum",
            "registrationState": "NotRegistered"
        }))
        .unwrap();
        assert!(!info.is_registered());
    }
}
