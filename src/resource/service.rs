//! Service (root module)
//!
//! A service has no parent scope. Its children are one resource per selected
//! subscription, loaded concurrently through a [`SubscriptionLoader`].

use super::entry::Resource;
use super::identity::{service_resource_id, Scope};
use super::module::ResourceModule;
use super::subscription::{ArmProviderCatalog, ProviderCatalog, ServiceSubscription};
use super::traits::{Cacheable, Discovered, RemoteLoadable, Refreshable};
use crate::azure::account::Account;
use crate::azure::context::AzureContext;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Fetches a service's per-subscription payload
#[async_trait]
pub trait SubscriptionLoader<R>: Send + Sync {
    async fn load_resource_from_azure(
        &self,
        subscription_id: &str,
        resource_group: Option<&str>,
    ) -> Result<R>;

    fn load_status(&self, _remote: &R) -> Option<String> {
        None
    }
}

/// Adapts a [`SubscriptionLoader`] to a module hook that fans out across
/// the account's selected subscriptions
struct FanOutLoader<R> {
    account: Arc<dyn Account>,
    inner: Arc<dyn SubscriptionLoader<R>>,
    max_concurrency: usize,
}

#[async_trait]
impl<R: Send + Sync + 'static> RemoteLoadable<R> for FanOutLoader<R> {
    async fn load_resources(&self) -> Result<Vec<Discovered<R>>> {
        if !self.account.is_logged_in() {
            return Err(Error::Authentication("not signed in, run 'az login'".to_string()));
        }

        let subscriptions = self.account.selected_subscriptions()?;
        tracing::info!(
            "Loading from {} subscriptions ({} at a time)",
            subscriptions.len(),
            self.max_concurrency
        );

        let discovered = stream::iter(subscriptions)
            .map(|subscription| {
                let inner = self.inner.clone();
                async move {
                    let remote = inner.load_resource_from_azure(&subscription.id, None).await;
                    Discovered {
                        name: subscription.id,
                        resource_group: None,
                        remote,
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(discovered)
    }

    async fn load_resource(&self, name: &str, resource_group: Option<&str>) -> Result<Option<R>> {
        match self.inner.load_resource_from_azure(name, resource_group).await {
            Ok(remote) => Ok(Some(remote)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn load_status(&self, remote: &R) -> Option<String> {
        self.inner.load_status(remote)
    }
}

/// An Azure service across every selected subscription
pub struct Service<R> {
    module: ResourceModule<R>,
    context: AzureContext,
    catalog: Arc<dyn ProviderCatalog>,
}

impl<R: Send + Sync + 'static> Service<R> {
    /// `name` is the provider namespace, e.g. `Microsoft.Web`
    pub fn new(name: &str, loader: Arc<dyn SubscriptionLoader<R>>, context: AzureContext) -> Self {
        let fan_out = FanOutLoader {
            account: context.account.clone(),
            inner: loader,
            max_concurrency: context.max_concurrency(),
        };
        Self {
            module: ResourceModule::new(name, Scope::None, Arc::new(fan_out)),
            catalog: Arc::new(ArmProviderCatalog::new(context.clone())),
            context,
        }
    }

    /// Replace where provider metadata comes from
    pub fn with_catalog(mut self, catalog: Arc<dyn ProviderCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn module(&self) -> &ResourceModule<R> {
        &self.module
    }

    pub fn get(&self, name: &str, resource_group: Option<&str>) -> Arc<Resource<R>> {
        self.module.get(name, resource_group)
    }

    /// Per-subscription root, same as `get(subscription_id, None)`
    pub fn for_subscription(&self, subscription_id: &str) -> Arc<Resource<R>> {
        self.module.get(subscription_id, None)
    }

    pub async fn list(&self) -> Result<Vec<Arc<Resource<R>>>> {
        self.module.list().await
    }

    pub async fn reload(&self) -> Result<Vec<Arc<Resource<R>>>> {
        self.module.reload().await
    }

    /// `/subscriptions/{name}/resourceGroups/{rg}/providers/{service}`
    pub fn to_resource_id(&self, name: &str, resource_group: Option<&str>) -> String {
        service_resource_id(self.module.name(), name, resource_group)
    }

    /// Region and provider queries for one subscription
    pub fn subscription(&self, subscription_id: &str) -> ServiceSubscription {
        ServiceSubscription::new(
            self.module.name(),
            subscription_id,
            self.context.account.clone(),
            self.catalog.clone(),
        )
    }
}

impl<R> Refreshable for Service<R> {
    fn refresh(&self) {
        self.module.refresh();
    }
}

impl<R> Cacheable for Service<R> {
    fn is_loaded(&self) -> bool {
        self.module.is_loaded()
    }

    fn clear_cache(&self) {
        self.module.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::http::HttpClientProvider;
    use crate::config::{AzureConfiguration, ConfigHandle};
    use crate::resource::testing::{FakeAccount, FakeSubscriptionLoader, Outcome};
    use std::time::Duration;

    fn context(account: FakeAccount, max_concurrent: usize) -> AzureContext {
        let config = ConfigHandle::new(AzureConfiguration {
            max_concurrent_subscriptions: max_concurrent,
            ..Default::default()
        });
        let http = Arc::new(HttpClientProvider::new(config.clone()));
        AzureContext::new(config, Arc::new(account), http)
    }

    fn service(account: FakeAccount, loader: Arc<FakeSubscriptionLoader>) -> Service<String> {
        Service::new("Microsoft.Web", loader, context(account, 4))
    }

    #[tokio::test]
    async fn test_list_fans_out_per_subscription() {
        let loader = Arc::new(FakeSubscriptionLoader::default());
        let service = service(FakeAccount::new(&["s1", "s2", "s3"]), loader);

        let listed = service.list().await.unwrap();
        let mut ids: Vec<&str> = listed.iter().map(|r| r.name()).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);

        let s2 = service.for_subscription("s2");
        assert!(listed.iter().any(|r| Arc::ptr_eq(r, &s2)));
        assert_eq!(s2.cached_remote().unwrap().as_str(), "provider@s2");
        assert_eq!(s2.resource_group(), None);
    }

    #[test]
    fn test_for_subscription_equals_get() {
        let service = service(
            FakeAccount::new(&["s1"]),
            Arc::new(FakeSubscriptionLoader::default()),
        );
        assert!(Arc::ptr_eq(&service.for_subscription("s1"), &service.get("s1", None)));
        assert_eq!(
            service.for_subscription("s1").id(),
            "/subscriptions/s1/resourceGroups/${rg}/providers/Microsoft.Web"
        );
    }

    #[tokio::test]
    async fn test_failed_subscription_is_isolated() {
        let loader = Arc::new(FakeSubscriptionLoader::default());
        loader.set("s2", Outcome::Failed("503".to_string()));
        let service = service(FakeAccount::new(&["s1", "s2", "s3"]), loader);

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed.iter().filter(|r| r.status().is_ok()).count(), 2);
        assert!(service.for_subscription("s2").error().is_some());
    }

    #[tokio::test]
    async fn test_authentication_failure_propagates() {
        let loader = Arc::new(FakeSubscriptionLoader::default());
        loader.set("s3", Outcome::Unauthorized);
        let service = service(FakeAccount::new(&["s1", "s2", "s3"]), loader);

        assert!(matches!(service.list().await, Err(Error::Authentication(_))));
        assert!(!service.is_loaded());
    }

    #[tokio::test]
    async fn test_logged_out_account() {
        let service = service(
            FakeAccount::logged_out(),
            Arc::new(FakeSubscriptionLoader::default()),
        );
        assert!(matches!(service.list().await, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_no_selected_subscriptions_lists_nothing() {
        let service = service(FakeAccount::new(&[]), Arc::new(FakeSubscriptionLoader::default()));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let loader = Arc::new(FakeSubscriptionLoader::new(Duration::from_millis(20)));
        let ids = ["s1", "s2", "s3", "s4", "s5", "s6", "s7"];
        let service = Service::new(
            "Microsoft.Web",
            loader.clone() as Arc<dyn SubscriptionLoader<String>>,
            context(FakeAccount::new(&ids), 2),
        );

        assert_eq!(service.list().await.unwrap().len(), ids.len());
        assert!(loader.peak() <= 2, "peak concurrency was {}", loader.peak());
        assert!(loader.peak() >= 1);
    }

    #[tokio::test]
    async fn test_refresh_invalidates_subscriptions() {
        let loader = Arc::new(FakeSubscriptionLoader::default());
        let service = service(FakeAccount::new(&["s1"]), loader.clone());
        service.list().await.unwrap();

        loader.set("s1", Outcome::Found("updated".to_string()));
        service.refresh();
        assert!(service.for_subscription("s1").cached_remote().is_none());

        let s1 = service.for_subscription("s1");
        assert_eq!(s1.remote().await.unwrap().as_str(), "updated");
    }

    #[test]
    fn test_to_resource_id() {
        let service = service(FakeAccount::new(&[]), Arc::new(FakeSubscriptionLoader::default()));
        assert_eq!(
            service.to_resource_id("foo", None),
            "/subscriptions/foo/resourceGroups/${rg}/providers/Microsoft.Web"
        );
        assert_eq!(
            service.to_resource_id("foo", Some("rg1")),
            "/subscriptions/foo/resourceGroups/rg1/providers/Microsoft.Web"
        );
    }
}
