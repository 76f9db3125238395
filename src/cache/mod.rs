pub mod store;

use crate::config::{CacheConfig, ServerConfig};
use crate::error::{ClientError, ClientResult};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

pub use store::{CacheStore, CachedResponse};

/// Tag of the cache generation the current build populates. Bump this
/// to obsolete every previously stored shell.
pub const SHELL_GENERATION: &str = "shell-v2";

/// Lifecycle of an offline cache worker. Transitions only move forward
/// within one process; a failed install falls back to `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    New,
    Installing,
    Installed,
    Activating,
    Activated,
}

/// Populates and serves named cache generations under
/// `<data_dir>/caches/<generation>/`.
///
/// Install fetches the configured application shell into the current
/// generation, all entries or none. Activate deletes every other
/// generation so that exactly one remains. Lookups consult the current
/// generation first and fall back to the remaining ones in name order;
/// a generation stored by an earlier run keeps serving until activation
/// prunes it, even when the current install has failed.
pub struct CacheWorker {
    http: reqwest::Client,
    base: Url,
    root: PathBuf,
    generation: String,
    shell: Vec<String>,
    state: RwLock<WorkerState>,
    current: RwLock<Option<Arc<CacheStore>>>,
}

impl CacheWorker {
    pub fn new(
        server: &ServerConfig,
        cache: &CacheConfig,
        data_dir: &Path,
    ) -> ClientResult<Self> {
        let base = Url::parse(&server.url)
            .map_err(|e| ClientError::BadRequest(format!("invalid server url: {e}")))?;
        let generation = cache
            .generation
            .clone()
            .unwrap_or_else(|| SHELL_GENERATION.to_string());
        if generation.is_empty() || generation.contains(['/', '\\']) || generation.contains("..") {
            return Err(ClientError::BadRequest(format!(
                "invalid cache generation name: {generation}"
            )));
        }
        let root = data_dir.join("caches");
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            root,
            generation,
            shell: cache.shell.clone(),
            state: RwLock::new(WorkerState::New),
            current: RwLock::new(None),
        })
    }

    /// Registration gate. When caching is disabled there is no worker
    /// and every request goes straight to the network.
    pub fn register(
        server: &ServerConfig,
        cache: &CacheConfig,
        data_dir: &Path,
    ) -> ClientResult<Option<Arc<CacheWorker>>> {
        if !cache.enabled {
            warn!("offline cache disabled; requests will not be intercepted");
            return Ok(None);
        }
        Ok(Some(Arc::new(Self::new(server, cache, data_dir)?)))
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap()
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.write().unwrap() = next;
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Runs install then activate, the normal startup sequence.
    pub async fn start(&self) -> ClientResult<()> {
        self.install().await?;
        self.activate().await
    }

    /// Fetches the application shell into the current generation.
    /// Already-complete generations are reused without touching the
    /// network. Any fetch failure discards the partial store.
    pub async fn install(&self) -> ClientResult<()> {
        if self.state() >= WorkerState::Installed {
            return Ok(());
        }
        self.set_state(WorkerState::Installing);
        let dir = self.generation_dir(&self.generation);
        match self.populate(&dir).await {
            Ok(store) => {
                *self.current.write().unwrap() = Some(Arc::new(store));
                self.set_state(WorkerState::Installed);
                info!(generation = %self.generation, "cache worker installed");
                Ok(())
            }
            Err(e) => {
                warn!(generation = %self.generation, error = %e,
                      "shell install failed; discarding partial store");
                if dir.exists() {
                    let _ = tokio::fs::remove_dir_all(&dir).await;
                }
                self.set_state(WorkerState::New);
                Err(e)
            }
        }
    }

    async fn populate(&self, dir: &Path) -> ClientResult<CacheStore> {
        let store = CacheStore::open(dir, &self.generation)?;

        let mut complete = true;
        for path in &self.shell {
            let url = self.shell_url(path)?;
            if !store.contains("GET", url.as_str())? {
                complete = false;
                break;
            }
        }
        if complete {
            debug!(generation = %self.generation, "generation already populated");
            return Ok(store);
        }

        for path in &self.shell {
            let url = self.shell_url(path)?;
            let resp = self.http.get(url.clone()).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ClientError::Api {
                    status: status.as_u16(),
                    message: format!("shell resource {url} unavailable"),
                });
            }
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = resp.bytes().await?;
            store.put("GET", url.as_str(), status.as_u16(), content_type.as_deref(), &body)?;
            debug!(url = %url, bytes = body.len(), "shell resource stored");
        }
        Ok(store)
    }

    fn shell_url(&self, path: &str) -> ClientResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ClientError::BadRequest(format!("invalid shell path {path}: {e}")))
    }

    /// Deletes every generation other than the current one. Deletions
    /// fan out concurrently; individual failures are logged and the
    /// stale directory is retried on the next activation.
    pub async fn activate(&self) -> ClientResult<()> {
        match self.state() {
            WorkerState::Activated => return Ok(()),
            WorkerState::Installed => {}
            other => {
                return Err(ClientError::Internal(format!(
                    "cache worker cannot activate from state {other:?}"
                )))
            }
        }
        self.set_state(WorkerState::Activating);

        let stale: Vec<PathBuf> = self
            .other_generations()?
            .into_iter()
            .map(|name| self.generation_dir(&name))
            .collect();
        let deletions = stale.iter().map(|dir| async move {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {
                    info!(path = %dir.display(), "pruned stale cache generation");
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to prune cache generation");
                }
            }
        });
        join_all(deletions).await;

        self.set_state(WorkerState::Activated);
        info!(generation = %self.generation, "cache worker activated");
        Ok(())
    }

    fn other_generations(&self) -> ClientResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name != self.generation {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Cache lookup across generations: the current store once it is
    /// installed, then earlier generations in name order. Earlier
    /// generations keep serving while the current install is pending or
    /// has failed.
    pub fn match_any(&self, method: &str, url: &str) -> ClientResult<Option<CachedResponse>> {
        let current = self.current.read().unwrap().clone();
        if let Some(store) = current {
            if let Some(hit) = store.lookup(method, url)? {
                return Ok(Some(hit));
            }
        }

        for name in self.other_generations()? {
            let dir = self.generation_dir(&name);
            if !dir.join("index.db").exists() {
                continue;
            }
            let store = CacheStore::open(&dir, &name)?;
            if let Some(hit) = store.lookup(method, url)? {
                debug!(generation = %name, url, "served from stale generation");
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}
