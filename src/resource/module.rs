//! Resource Module
//!
//! A module lazily materializes and caches the children of one parent scope.
//! Lookups never touch the network; listing and payload access do, through
//! the module's [`RemoteLoadable`] hook.

use super::entry::Resource;
use super::identity::{
    normalize_resource_group, scoped_resource_id, service_resource_id, ResourceKey, Scope,
};
use super::traits::{Cacheable, RemoteLoadable, Refreshable};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub struct ResourceModule<R> {
    name: String,
    scope: Scope,
    loader: Arc<dyn RemoteLoadable<R>>,
    resources: RwLock<HashMap<ResourceKey, Arc<Resource<R>>>>,
    synced: AtomicBool,
    /// Bumped by refresh and eviction; a listing started before the bump
    /// is discarded
    generation: AtomicU64,
    list_lock: tokio::sync::Mutex<()>,
}

impl<R: Send + Sync + 'static> ResourceModule<R> {
    pub fn new(name: &str, scope: Scope, loader: Arc<dyn RemoteLoadable<R>>) -> Self {
        Self {
            name: name.to_string(),
            scope,
            loader,
            resources: RwLock::new(HashMap::new()),
            synced: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            list_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Resource type this module holds, e.g. `Microsoft.Web/sites`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Canonical id of a child; pure
    pub fn to_resource_id(&self, name: &str, resource_group: Option<&str>) -> String {
        if let Some(id) = self.loader.resource_id(name, resource_group) {
            return id;
        }
        match &self.scope {
            Scope::None => service_resource_id(&self.name, name, resource_group),
            Scope::Subscription(subscription_id) => {
                scoped_resource_id(subscription_id, &self.name, name, resource_group)
            }
        }
    }

    /// Cached entry for `(name, resource_group)`, created without a payload
    /// if absent. Repeated calls return the same instance.
    pub fn get(&self, name: &str, resource_group: Option<&str>) -> Arc<Resource<R>> {
        let key = ResourceKey::new(name, resource_group);
        let existing = self.resources.read().get(&key).cloned();
        if let Some(existing) = existing {
            return existing;
        }

        let mut resources = self.resources.write();
        self.entry(&mut resources, key, name, resource_group)
    }

    fn entry(
        &self,
        resources: &mut HashMap<ResourceKey, Arc<Resource<R>>>,
        key: ResourceKey,
        name: &str,
        resource_group: Option<&str>,
    ) -> Arc<Resource<R>> {
        resources
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Resource::new(
                    name.trim(),
                    normalize_resource_group(resource_group),
                    &self.name,
                    self.to_resource_id(name.trim(), resource_group),
                    self.loader.clone(),
                ))
            })
            .clone()
    }

    /// Cached entries, no I/O; order unspecified
    pub fn cached(&self) -> Vec<Arc<Resource<R>>> {
        self.resources.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }

    /// Every cached resource, after loading from Azure if not yet synced
    ///
    /// New resources are added; entries that already hold a settled payload
    /// are left as they are. Failures of single resources end up in their
    /// status. Configuration and authentication failures abort the call. A
    /// refresh or eviction that lands while the hook runs discards its
    /// result, so the next call loads again.
    #[tracing::instrument(name = "module.list", skip(self), fields(module = %self.name))]
    pub async fn list(&self) -> Result<Vec<Arc<Resource<R>>>> {
        if self.synced.load(Ordering::Acquire) {
            return Ok(self.cached());
        }

        let _guard = self.list_lock.lock().await;
        if self.synced.load(Ordering::Acquire) {
            return Ok(self.cached());
        }

        tracing::debug!("Loading {} resources from Azure", self.name);
        let generation = self.generation.load(Ordering::Acquire);
        let mut discovered = self.loader.load_resources().await?;

        if let Some(pos) = discovered
            .iter()
            .position(|d| d.remote.as_ref().err().is_some_and(|e| e.is_fatal()))
        {
            if let Err(e) = discovered.swap_remove(pos).remote {
                return Err(e);
            }
        }

        // Refresh and eviction bump the generation under this lock
        let mut resources = self.resources.write();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("{} was refreshed during listing, discarding result", self.name);
            return Ok(resources.values().cloned().collect());
        }

        let total = discovered.len();
        let mut failed = 0;
        for item in discovered {
            if item.remote.is_err() {
                failed += 1;
            }
            let key = ResourceKey::new(&item.name, item.resource_group.as_deref());
            self.entry(&mut resources, key, &item.name, item.resource_group.as_deref())
                .merge(item.remote);
        }

        if failed > 0 {
            tracing::warn!("{}: {} of {} resources failed to load", self.name, failed, total);
        } else {
            tracing::debug!("{}: loaded {} resources", self.name, total);
        }

        self.synced.store(true, Ordering::Release);
        Ok(resources.values().cloned().collect())
    }

    /// Refresh, then list again
    pub async fn reload(&self) -> Result<Vec<Arc<Resource<R>>>> {
        self.refresh();
        self.list().await
    }
}

impl<R> Refreshable for ResourceModule<R> {
    fn refresh(&self) {
        let resources = self.resources.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.synced.store(false, Ordering::Release);
        for resource in resources.values() {
            resource.refresh();
        }
    }
}

impl<R> Cacheable for ResourceModule<R> {
    fn is_loaded(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    fn clear_cache(&self) {
        let mut resources = self.resources.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.synced.store(false, Ordering::Release);
        resources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::resource::status::Status;
    use crate::resource::testing::{FakeLoader, Outcome};

    fn module(loader: Arc<FakeLoader>) -> ResourceModule<String> {
        ResourceModule::new(
            "Microsoft.Web/sites",
            Scope::Subscription("sub-1".to_string()),
            loader,
        )
    }

    fn names(resources: &[Arc<Resource<String>>]) -> Vec<String> {
        let mut names: Vec<String> = resources.iter().map(|r| r.name().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_get_returns_same_instance() {
        let loader = FakeLoader::new(&[]);
        let module = module(loader.clone());

        let first = module.get("app", Some("rg"));
        let second = module.get("app", Some("rg"));
        let other_case = module.get("APP", Some("RG"));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &other_case));
        assert_eq!(module.len(), 1);
        assert_eq!(loader.fetch_calls(), 0);
        assert!(matches!(first.status(), Status::Unknown));
    }

    #[test]
    fn test_get_keeps_first_identity() {
        let module = module(FakeLoader::new(&[]));
        let resource = module.get("MyApp", Some("MyGroup"));
        let again = module.get("myapp", Some("mygroup"));
        assert_eq!(again.name(), "MyApp");
        assert_eq!(again.resource_group(), Some("MyGroup"));
        assert_eq!(
            resource.id(),
            "/subscriptions/sub-1/resourceGroups/MyGroup/providers/Microsoft.Web/sites/MyApp"
        );
    }

    #[tokio::test]
    async fn test_list_is_idempotent() {
        let loader = FakeLoader::new(&["a", "b"]);
        let module = module(loader.clone());

        let first = module.list().await.unwrap();
        let second = module.list().await.unwrap();

        assert_eq!(names(&first), names(&second));
        assert_eq!(first.len(), 2);
        for resource in &first {
            let same = module.get(resource.name(), Some("rg"));
            assert!(second.iter().any(|r| Arc::ptr_eq(r, &same)));
        }
        assert_eq!(loader.list_calls(), 1);
        assert!(module.is_loaded());
    }

    #[tokio::test]
    async fn test_list_keeps_entries_created_by_get() {
        let loader = FakeLoader::new(&["a"]);
        let module = module(loader);

        let early = module.get("a", Some("rg"));
        let local_only = module.get("draft", None);
        let listed = module.list().await.unwrap();

        assert_eq!(names(&listed), vec!["a".to_string(), "draft".to_string()]);
        assert!(listed.iter().any(|r| Arc::ptr_eq(r, &early)));
        assert!(early.exists());
        assert!(!local_only.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_sibling_does_not_abort_list() {
        let loader = FakeLoader::new(&["a", "b"]);
        loader.set("c", Outcome::Failed("connection reset".to_string()));
        let module = module(loader);

        let listed = module.list().await.unwrap();
        assert_eq!(listed.len(), 3);

        let ok: Vec<_> = listed.iter().filter(|r| r.status().is_ok()).collect();
        assert_eq!(ok.len(), 2);

        let failed = module.get("c", Some("rg"));
        assert!(failed.status().is_error());
        let cause = failed.error().expect("cause is retrievable");
        assert!(cause.to_string().contains("connection reset"));

        let err = failed.remote().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_list() {
        let loader = FakeLoader::new(&["a"]);
        loader.set("b", Outcome::Unauthorized);
        let module = module(loader);

        let err = module.list().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(!module.is_loaded());
    }

    #[tokio::test]
    async fn test_refresh_cascades_and_relists() {
        let loader = FakeLoader::new(&["a", "b"]);
        let module = module(loader.clone());
        let listed = module.list().await.unwrap();

        module.refresh();
        assert!(!module.is_loaded());
        for resource in &listed {
            assert!(matches!(resource.status(), Status::Unknown));
            assert!(resource.cached_remote().is_none());
        }

        loader.set("a", Outcome::Found("payload-a2".to_string()));
        let relisted = module.list().await.unwrap();
        assert_eq!(loader.list_calls(), 2);
        assert_eq!(names(&listed), names(&relisted));

        let a = module.get("a", Some("rg"));
        assert_eq!(a.remote().await.unwrap().as_str(), "payload-a2");
    }

    #[tokio::test]
    async fn test_remote_is_fetched_lazily_once() {
        let loader = FakeLoader::new(&["a"]);
        let module = module(loader.clone());
        let a = module.get("a", Some("rg"));

        assert!(a.cached_remote().is_none());
        assert_eq!(a.remote().await.unwrap().as_str(), "payload-a");
        assert_eq!(a.remote().await.unwrap().as_str(), "payload-a");
        assert_eq!(loader.fetch_calls(), 1);
        assert_eq!(a.status().to_string(), "Running");
    }

    #[tokio::test]
    async fn test_concurrent_remote_is_single_flight() {
        let loader = FakeLoader::new(&["a"]);
        let module = module(loader.clone());
        let a = module.get("a", Some("rg"));

        let (first, second) = tokio::join!(a.remote(), a.remote());
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert_eq!(loader.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_remote_becomes_not_found() {
        let module = module(FakeLoader::new(&[]));
        let ghost = module.get("ghost", Some("rg"));

        let err = ghost.remote().await.unwrap_err();
        assert!(err.is_not_found());
        assert!(ghost.status().is_error());
        assert!(!ghost.exists());
    }

    #[tokio::test]
    async fn test_single_resource_refresh() {
        let loader = FakeLoader::new(&["a", "b"]);
        let module = module(loader.clone());
        module.list().await.unwrap();

        loader.set("a", Outcome::Found("payload-a2".to_string()));
        loader.set("b", Outcome::Found("payload-b2".to_string()));

        let a = module.get("a", Some("rg"));
        a.refresh();
        assert_eq!(a.remote().await.unwrap().as_str(), "payload-a2");

        let b = module.get("b", Some("rg"));
        assert_eq!(b.cached_remote().unwrap().as_str(), "payload-b");
        assert!(module.is_loaded());
    }

    #[tokio::test]
    async fn test_vanished_resource_stays_cached_until_fetched() {
        let loader = FakeLoader::new(&["a", "b"]);
        let module = module(loader.clone());
        module.list().await.unwrap();

        loader.remove("b");
        let relisted = module.reload().await.unwrap();
        assert_eq!(relisted.len(), 2);

        let b = module.get("b", Some("rg"));
        assert!(b.remote().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clear_cache_evicts_everything() {
        let module = module(FakeLoader::new(&["a"]));
        let before = module.get("a", Some("rg"));
        module.list().await.unwrap();

        module.clear_cache();
        assert!(module.is_empty());
        assert!(!module.is_loaded());

        let after = module.get("a", Some("rg"));
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_refresh_during_list_discards_result() {
        let loader = FakeLoader::new(&["a"]);
        let module = Arc::new(module(loader.clone()));
        let gate = loader.gate();

        let listing = tokio::spawn({
            let module = module.clone();
            async move { module.list().await.map(|listed| listed.len()) }
        });
        gate.entered.notified().await;

        module.refresh();
        loader.set("a", Outcome::Found("payload-a2".to_string()));
        loader.ungate();
        gate.release.notify_one();

        listing.await.unwrap().unwrap();
        assert!(!module.is_loaded());
        assert!(module.get("a", Some("rg")).cached_remote().is_none());

        module.list().await.unwrap();
        assert_eq!(loader.list_calls(), 2);
        assert!(module.is_loaded());
        let a = module.get("a", Some("rg"));
        assert_eq!(a.cached_remote().unwrap().as_str(), "payload-a2");
    }

    #[tokio::test]
    async fn test_clear_cache_during_list_keeps_cache_empty() {
        let loader = FakeLoader::new(&["a", "b"]);
        let module = Arc::new(module(loader.clone()));
        let gate = loader.gate();

        let listing = tokio::spawn({
            let module = module.clone();
            async move { module.list().await.map(|listed| listed.len()) }
        });
        gate.entered.notified().await;

        module.clear_cache();
        loader.ungate();
        gate.release.notify_one();

        assert_eq!(listing.await.unwrap().unwrap(), 0);
        assert!(module.is_empty());
        assert!(!module.is_loaded());
    }

    #[tokio::test]
    async fn test_refresh_during_fetch_is_not_cached() {
        let loader = FakeLoader::new(&["a"]);
        let module = module(loader.clone());
        let a = module.get("a", Some("rg"));
        let gate = loader.gate();

        let fetch = tokio::spawn({
            let a = a.clone();
            async move { a.remote().await.map(|remote| remote.to_string()) }
        });
        gate.entered.notified().await;

        a.refresh();
        loader.set("a", Outcome::Found("payload-a2".to_string()));
        loader.ungate();
        gate.release.notify_one();

        assert_eq!(fetch.await.unwrap().unwrap(), "payload-a");
        assert!(a.cached_remote().is_none());
        assert!(matches!(a.status(), Status::Unknown));

        assert_eq!(a.remote().await.unwrap().as_str(), "payload-a2");
        assert_eq!(loader.fetch_calls(), 2);
    }

    #[test]
    fn test_service_scope_ids() {
        let module: ResourceModule<String> =
            ResourceModule::new("Microsoft.Web", Scope::None, FakeLoader::new(&[]));
        assert_eq!(
            module.to_resource_id("foo", None),
            "/subscriptions/foo/resourceGroups/${rg}/providers/Microsoft.Web"
        );
    }
}
