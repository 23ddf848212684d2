//! Cached resource entry

use super::status::Status;
use super::traits::{Cacheable, RemoteLoadable, Refreshable};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct State<R> {
    remote: Option<Arc<R>>,
    status: Status,
}

impl<R> Default for State<R> {
    fn default() -> Self {
        Self {
            remote: None,
            status: Status::Unknown,
        }
    }
}

/// A single Azure resource tracked by a module
///
/// Identity (name, group, type, id) is fixed at construction. Only the
/// remote snapshot and its status change.
pub struct Resource<R> {
    name: String,
    resource_group: Option<String>,
    resource_type: String,
    id: String,
    state: RwLock<State<R>>,
    /// Bumped by every refresh; a fetch that started under an older value
    /// must not write back
    generation: AtomicU64,
    fetch_lock: tokio::sync::Mutex<()>,
    loader: Arc<dyn RemoteLoadable<R>>,
}

impl<R: Send + Sync + 'static> Resource<R> {
    pub(crate) fn new(
        name: &str,
        resource_group: Option<&str>,
        resource_type: &str,
        id: String,
        loader: Arc<dyn RemoteLoadable<R>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            resource_group: resource_group.map(str::to_string),
            resource_type: resource_type.to_string(),
            id,
            state: RwLock::new(State::default()),
            generation: AtomicU64::new(0),
            fetch_lock: tokio::sync::Mutex::new(()),
            loader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> Status {
        self.state.read().status.clone()
    }

    /// Cause of the last failed fetch; never raises
    pub fn error(&self) -> Option<Arc<Error>> {
        self.state.read().status.error().cloned()
    }

    /// Cached payload without fetching
    pub fn cached_remote(&self) -> Option<Arc<R>> {
        self.state.read().remote.clone()
    }

    /// True once a payload has been fetched successfully
    pub fn exists(&self) -> bool {
        let state = self.state.read();
        state.status.is_ok() && state.remote.is_some()
    }

    /// The remote payload, fetched on first use after creation or refresh
    ///
    /// Raises when the cached status is an error, carrying its cause. A
    /// refresh that lands while the fetch is in flight wins: the caller still
    /// gets what was fetched, but nothing is cached.
    #[tracing::instrument(name = "resource.load", skip(self), fields(id = %self.id))]
    pub async fn remote(&self) -> Result<Arc<R>> {
        if let Some(remote) = self.settled()? {
            return Ok(remote);
        }

        let _guard = self.fetch_lock.lock().await;
        if let Some(remote) = self.settled()? {
            return Ok(remote);
        }

        let generation = {
            let mut state = self.state.write();
            state.status = Status::Loading;
            self.generation.load(Ordering::Acquire)
        };
        tracing::debug!("Fetching {} '{}'", self.resource_type, self.name);

        let loaded = self
            .loader
            .load_resource(&self.name, self.resource_group.as_deref())
            .await;

        match loaded {
            Ok(Some(remote)) => {
                let detail = self.loader.load_status(&remote);
                let remote = Arc::new(remote);
                self.commit(generation, Status::Ok { detail }, Some(remote.clone()));
                Ok(remote)
            }
            Ok(None) => {
                let cause = Arc::new(Error::not_found(&self.resource_type, &self.name));
                self.commit(generation, Status::Error(cause.clone()), None);
                Err(Error::Unavailable {
                    id: self.id.clone(),
                    cause,
                })
            }
            Err(e) if e.is_fatal() => {
                // Nothing to cache, the next call should try again
                self.commit(generation, Status::Unknown, None);
                Err(e)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {} '{}': {}", self.resource_type, self.name, e);
                let cause = Arc::new(e);
                self.commit(generation, Status::Error(cause.clone()), None);
                Err(Error::Unavailable {
                    id: self.id.clone(),
                    cause,
                })
            }
        }
    }

    /// Store a fetch outcome unless a refresh happened since `generation`
    fn commit(&self, generation: u64, status: Status, remote: Option<Arc<R>>) {
        let mut state = self.state.write();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("{} '{}' was refreshed during fetch, not caching", self.resource_type, self.name);
            return;
        }
        state.remote = remote;
        state.status = status;
    }

    /// `Some` for a cached payload, `Err` for a cached failure, `None` otherwise
    fn settled(&self) -> Result<Option<Arc<R>>> {
        let state = self.state.read();
        match (&state.status, &state.remote) {
            (Status::Ok { .. }, Some(remote)) => Ok(Some(remote.clone())),
            (Status::Error(cause), _) => Err(Error::Unavailable {
                id: self.id.clone(),
                cause: cause.clone(),
            }),
            _ => Ok(None),
        }
    }

    fn set_remote(&self, remote: R) {
        let detail = self.loader.load_status(&remote);
        let mut state = self.state.write();
        state.remote = Some(Arc::new(remote));
        state.status = Status::Ok { detail };
    }

    fn set_error(&self, error: Error) {
        let mut state = self.state.write();
        state.remote = None;
        state.status = Status::Error(Arc::new(error));
    }

    /// Apply a listing result unless a fetch already settled this entry
    pub(crate) fn merge(&self, remote: Result<R>) {
        if self.is_loaded() {
            return;
        }
        match remote {
            Ok(remote) => self.set_remote(remote),
            Err(e) => {
                tracing::warn!("{} '{}' failed to load: {}", self.resource_type, self.name, e);
                self.set_error(e);
            }
        }
    }
}

impl<R> Refreshable for Resource<R> {
    fn refresh(&self) {
        let mut state = self.state.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = State::default();
    }
}

impl<R> Cacheable for Resource<R> {
    fn is_loaded(&self) -> bool {
        self.state.read().status.is_settled()
    }

    fn clear_cache(&self) {
        self.refresh();
    }
}

impl<R> fmt::Debug for Resource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("status", &self.state.read().status)
            .finish()
    }
}
