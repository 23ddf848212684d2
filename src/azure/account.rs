//! Azure Account
//!
//! The account is the read-only subscription context the resource layer
//! works in: who is signed in, which subscriptions are selected, which
//! regions each subscription can use, and how to get a token for it.
//!
//! [`CliProfileAccount`] reads the profile the Azure CLI maintains after
//! `az login`; it never signs anyone in.

use super::auth::{AzureCliCredential, StaticTokenCredential, TokenCredential};
use super::client::ArmClient;
use super::environment::AzureEnvironment;
use super::http::HttpClientProvider;
use super::region::{LocationPayload, Region};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Subscription information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Subscription {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            tenant_id: String::new(),
            state: "Enabled".to_string(),
            is_default: false,
        }
    }
}

/// Signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub username: String,
    pub user_type: String,
    pub tenant_id: String,
    pub environment: AzureEnvironment,
}

/// Subscription context supplied to the resource layer
#[async_trait]
pub trait Account: Send + Sync {
    fn is_logged_in(&self) -> bool;

    /// The signed-in identity; `Authentication` error when nobody is
    fn account(&self) -> Result<AccountInfo>;

    fn selected_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Regions available to a subscription, in the order Azure lists them
    async fn list_regions(&self, subscription_id: &str) -> Result<Vec<Region>>;

    fn token_credential(&self, subscription_id: &str) -> Result<Arc<dyn TokenCredential>>;

    fn environment(&self) -> AzureEnvironment;
}

/// Shape of `azureProfile.json`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ProfileFile {
    #[serde(default)]
    subscriptions: Vec<ProfileSubscription>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSubscription {
    id: String,
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    is_default: bool,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    environment_name: Option<String>,
    #[serde(default)]
    user: Option<ProfileUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProfileUser {
    name: String,
    #[serde(rename = "type")]
    user_type: String,
}

impl From<&ProfileSubscription> for Subscription {
    fn from(value: &ProfileSubscription) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
            tenant_id: value.tenant_id.clone(),
            state: value.state.clone(),
            is_default: value.is_default,
        }
    }
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    // Check AZURE_CONFIG_DIR environment variable first
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Account backed by the Azure CLI profile
pub struct CliProfileAccount {
    profile: ProfileFile,
    selection: Vec<String>,
    http: Arc<HttpClientProvider>,
    token_override: Option<StaticTokenCredential>,
    credentials: Mutex<HashMap<String, Arc<dyn TokenCredential>>>,
    regions: Mutex<HashMap<String, Vec<Region>>>,
    base_url: Option<String>,
}

impl CliProfileAccount {
    /// Load `azureProfile.json`; a missing file means "not logged in"
    pub fn load(selection: Vec<String>, http: Arc<HttpClientProvider>) -> Result<Self> {
        let path = get_azure_config_dir()
            .map(|d| d.join("azureProfile.json"))
            .ok_or_else(|| Error::Configuration("cannot locate the Azure CLI config directory".to_string()))?;

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No Azure CLI profile at {:?}", path);
                String::new()
            }
            Err(e) => {
                return Err(Error::Configuration(format!("cannot read {:?}: {}", path, e)));
            }
        };

        Self::from_profile_str(&content, selection, http)
    }

    /// Parse profile JSON directly (the CLI writes it with a BOM)
    pub fn from_profile_str(
        content: &str,
        selection: Vec<String>,
        http: Arc<HttpClientProvider>,
    ) -> Result<Self> {
        let trimmed = content.trim_start_matches('\u{feff}').trim();
        let profile = if trimmed.is_empty() {
            ProfileFile::default()
        } else {
            serde_json::from_str(trimmed)
                .map_err(|e| Error::Configuration(format!("malformed azureProfile.json: {}", e)))?
        };

        Ok(Self {
            profile,
            selection,
            http,
            token_override: StaticTokenCredential::from_env(),
            credentials: Mutex::new(HashMap::new()),
            regions: Mutex::new(HashMap::new()),
            base_url: None,
        })
    }

    /// Use a fixed token for every subscription instead of the CLI
    pub fn with_token(mut self, credential: StaticTokenCredential) -> Self {
        self.token_override = Some(credential);
        self
    }

    /// Send region queries somewhere other than the environment's endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    fn default_entry(&self) -> Option<&ProfileSubscription> {
        self.profile
            .subscriptions
            .iter()
            .find(|s| s.is_default)
            .or_else(|| self.profile.subscriptions.first())
    }

    fn find(&self, subscription_id: &str) -> Option<&ProfileSubscription> {
        self.profile
            .subscriptions
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(subscription_id))
    }

    fn arm_client(&self, subscription_id: &str) -> Result<ArmClient> {
        let client = ArmClient::new(
            self.http.get()?,
            self.token_credential(subscription_id)?,
            self.environment(),
        );
        Ok(match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        })
    }
}

#[async_trait]
impl Account for CliProfileAccount {
    fn is_logged_in(&self) -> bool {
        !self.profile.subscriptions.is_empty()
    }

    fn account(&self) -> Result<AccountInfo> {
        let entry = self
            .default_entry()
            .ok_or_else(|| Error::Authentication("not signed in, run 'az login'".to_string()))?;
        let (username, user_type) = entry
            .user
            .as_ref()
            .map(|u| (u.name.clone(), u.user_type.clone()))
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));

        Ok(AccountInfo {
            username,
            user_type,
            tenant_id: entry.tenant_id.clone(),
            environment: self.environment(),
        })
    }

    fn selected_subscriptions(&self) -> Result<Vec<Subscription>> {
        if !self.is_logged_in() {
            return Err(Error::Authentication("not signed in, run 'az login'".to_string()));
        }

        if self.selection.is_empty() {
            return Ok(self.default_entry().map(Subscription::from).into_iter().collect());
        }

        let mut selected = Vec::new();
        for id in &self.selection {
            match self.find(id) {
                Some(entry) if entry.state.is_empty() || entry.state.eq_ignore_ascii_case("Enabled") => {
                    selected.push(Subscription::from(entry));
                }
                Some(entry) => {
                    tracing::warn!("Skipping subscription {} in state {}", entry.id, entry.state);
                }
                None => {
                    tracing::warn!("Selected subscription {} is not in the Azure CLI profile", id);
                }
            }
        }
        Ok(selected)
    }

    async fn list_regions(&self, subscription_id: &str) -> Result<Vec<Region>> {
        let cached = self.regions.lock().get(subscription_id).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let client = self.arm_client(subscription_id)?;
        let url = client.locations_url(subscription_id);
        let items = client.get_all(&url).await?;

        let regions: Vec<Region> = items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<LocationPayload>(v).ok())
            .filter(LocationPayload::is_physical)
            .map(Region::from)
            .collect();

        tracing::debug!("Loaded {} regions for {}", regions.len(), subscription_id);
        self.regions
            .lock()
            .insert(subscription_id.to_string(), regions.clone());
        Ok(regions)
    }

    fn token_credential(&self, subscription_id: &str) -> Result<Arc<dyn TokenCredential>> {
        if let Some(fixed) = &self.token_override {
            return Ok(Arc::new(fixed.clone()));
        }

        let entry = self
            .find(subscription_id)
            .ok_or_else(|| Error::not_found("subscription", subscription_id))?;

        let mut credentials = self.credentials.lock();
        let credential = credentials
            .entry(entry.id.clone())
            .or_insert_with(|| {
                Arc::new(AzureCliCredential::new(Some(&entry.id))) as Arc<dyn TokenCredential>
            });
        Ok(credential.clone())
    }

    fn environment(&self) -> AzureEnvironment {
        self.default_entry()
            .and_then(|s| s.environment_name.as_deref())
            .and_then(AzureEnvironment::from_name)
            .unwrap_or_default()
    }
}
