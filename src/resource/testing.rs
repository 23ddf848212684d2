//! In-memory stand-ins for Azure, used by unit tests

use super::service::SubscriptionLoader;
use super::subscription::{ProviderCatalog, ProviderResourceType};
use super::traits::{Discovered, RemoteLoadable};
use crate::azure::account::{Account, AccountInfo, Subscription};
use crate::azure::auth::{StaticTokenCredential, TokenCredential};
use crate::azure::environment::AzureEnvironment;
use crate::azure::region::Region;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
pub enum Outcome {
    Found(String),
    Failed(String),
    Unauthorized,
}

impl Outcome {
    fn to_result(&self, name: &str) -> Result<String> {
        match self {
            Outcome::Found(payload) => Ok(payload.clone()),
            Outcome::Failed(msg) => Err(Error::fetch(name, msg.clone())),
            Outcome::Unauthorized => Err(Error::Authentication("token expired".to_string())),
        }
    }
}

/// Holds loader calls until released
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// Remote side of a module: a map of name -> outcome
#[derive(Default)]
pub struct FakeLoader {
    remote: Mutex<BTreeMap<String, Outcome>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeLoader {
    pub fn new(names: &[&str]) -> Arc<Self> {
        let loader = Self::default();
        for name in names {
            loader.set(name, Outcome::Found(format!("payload-{}", name)));
        }
        Arc::new(loader)
    }

    pub fn set(&self, name: &str, outcome: Outcome) {
        self.remote.lock().insert(name.to_string(), outcome);
    }

    pub fn remove(&self, name: &str) {
        self.remote.lock().remove(name);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Make every following load wait on the returned gate
    pub fn gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn ungate(&self) {
        self.gate.lock().take();
    }

    async fn wait_at_gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }
}

#[async_trait]
impl RemoteLoadable<String> for FakeLoader {
    async fn load_resources(&self) -> Result<Vec<Discovered<String>>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let remote = self.remote.lock().clone();
        self.wait_at_gate().await;
        Ok(remote
            .iter()
            .map(|(name, outcome)| Discovered {
                name: name.clone(),
                resource_group: Some("rg".to_string()),
                remote: outcome.to_result(name),
            })
            .collect())
    }

    async fn load_resource(&self, name: &str, _resource_group: Option<&str>) -> Result<Option<String>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let outcome = self.remote.lock().get(name).cloned();
        self.wait_at_gate().await;
        outcome.map(|o| o.to_result(name)).transpose()
    }

    fn load_status(&self, remote: &String) -> Option<String> {
        remote.strip_prefix("payload-").map(|_| "Running".to_string())
    }
}

/// Per-subscription loader that records peak concurrency
#[derive(Default)]
pub struct FakeSubscriptionLoader {
    outcomes: Mutex<BTreeMap<String, Outcome>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl FakeSubscriptionLoader {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn set(&self, subscription_id: &str, outcome: Outcome) {
        self.outcomes.lock().insert(subscription_id.to_string(), outcome);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionLoader<String> for FakeSubscriptionLoader {
    async fn load_resource_from_azure(
        &self,
        subscription_id: &str,
        _resource_group: Option<&str>,
    ) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = self.outcomes.lock().get(subscription_id).cloned();
        match outcome {
            Some(outcome) => outcome.to_result(subscription_id),
            None => Ok(format!("provider@{}", subscription_id)),
        }
    }
}

pub struct FakeAccount {
    subscriptions: Vec<Subscription>,
    regions: Vec<Region>,
    logged_in: bool,
}

impl FakeAccount {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            subscriptions: ids.iter().map(|id| Subscription::new(id, id)).collect(),
            regions: Vec::new(),
            logged_in: true,
        }
    }

    pub fn logged_out() -> Self {
        Self {
            subscriptions: Vec::new(),
            regions: Vec::new(),
            logged_in: false,
        }
    }

    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = regions;
        self
    }
}

#[async_trait]
impl Account for FakeAccount {
    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn account(&self) -> Result<AccountInfo> {
        if !self.logged_in {
            return Err(Error::Authentication("not signed in".to_string()));
        }
        Ok(AccountInfo {
            username: "dev@contoso.com".to_string(),
            user_type: "user".to_string(),
            tenant_id: "tenant".to_string(),
            environment: AzureEnvironment::AzureCloud,
        })
    }

    fn selected_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.clone())
    }

    async fn list_regions(&self, _subscription_id: &str) -> Result<Vec<Region>> {
        Ok(self.regions.clone())
    }

    fn token_credential(&self, _subscription_id: &str) -> Result<Arc<dyn TokenCredential>> {
        Ok(Arc::new(StaticTokenCredential::new("test-token")))
    }

    fn environment(&self) -> AzureEnvironment {
        AzureEnvironment::AzureCloud
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    types: Vec<ProviderResourceType>,
}

impl FakeCatalog {
    pub fn with_type(resource_type: &str, locations: &[&str]) -> Self {
        Self {
            types: vec![ProviderResourceType {
                resource_type: resource_type.to_string(),
                locations: locations.iter().map(|l| l.to_string()).collect(),
                api_versions: vec!["2022-03-01".to_string()],
            }],
        }
    }
}

#[async_trait]
impl ProviderCatalog for FakeCatalog {
    async fn resource_types(
        &self,
        _subscription_id: &str,
        _namespace: &str,
    ) -> Result<Vec<ProviderResourceType>> {
        Ok(self.types.clone())
    }
}
