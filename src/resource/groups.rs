//! Resource groups
//!
//! Subscription-scoped module over `GET /subscriptions/{id}/resourcegroups`.

use super::module::ResourceModule;
use super::identity::Scope;
use super::traits::{Discovered, RemoteLoadable};
use crate::azure::context::AzureContext;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const RESOURCE_GROUP_TYPE: &str = "Microsoft.Resources/resourceGroups";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub properties: ResourceGroupProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupProperties {
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

struct ResourceGroupLoader {
    subscription_id: String,
    context: AzureContext,
}

#[async_trait]
impl RemoteLoadable<ResourceGroup> for ResourceGroupLoader {
    async fn load_resources(&self) -> Result<Vec<Discovered<ResourceGroup>>> {
        let client = self.context.arm_client(&self.subscription_id)?;
        let items = client
            .get_all(&client.resource_groups_url(&self.subscription_id))
            .await?;

        let mut discovered = Vec::with_capacity(items.len());
        for item in items {
            let Some(name) = item.get("name").and_then(Value::as_str).map(str::to_string) else {
                tracing::warn!("Skipping resource group without a name");
                continue;
            };
            discovered.push(match serde_json::from_value::<ResourceGroup>(item) {
                Ok(group) => Discovered::ok(name, None, group),
                Err(e) => {
                    let error = Error::fetch_with_source(&name, "unexpected resource group payload", e);
                    Discovered::failed(name, None, error)
                }
            });
        }
        Ok(discovered)
    }

    async fn load_resource(
        &self,
        name: &str,
        _resource_group: Option<&str>,
    ) -> Result<Option<ResourceGroup>> {
        let client = self.context.arm_client(&self.subscription_id)?;
        match client
            .get(&client.resource_group_url(&self.subscription_id, name))
            .await
        {
            Ok(value) => Ok(Some(serde_json::from_value(value).map_err(|e| {
                Error::fetch_with_source(name, "unexpected resource group payload", e)
            })?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn load_status(&self, remote: &ResourceGroup) -> Option<String> {
        remote.properties.provisioning_state.clone()
    }

    fn resource_id(&self, name: &str, _resource_group: Option<&str>) -> Option<String> {
        Some(format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, name
        ))
    }
}

/// Module of the resource groups in one subscription
pub fn resource_group_module(
    context: &AzureContext,
    subscription_id: &str,
) -> ResourceModule<ResourceGroup> {
    let loader = ResourceGroupLoader {
        subscription_id: subscription_id.to_string(),
        context: context.clone(),
    };
    ResourceModule::new(
        RESOURCE_GROUP_TYPE,
        Scope::Subscription(subscription_id.to_string()),
        Arc::new(loader),
    )
}
