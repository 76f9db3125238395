use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::api::ApiClient;
use crate::cache::CacheWorker;
use crate::config::Config;
use crate::error::ClientResult;
use crate::push::PushRegistrar;
use crate::session::SessionStore;

/// Everything a command needs: configuration, the stored session, the
/// API client and, when caching is enabled, the cache worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub data_dir: PathBuf,
    pub session: Arc<SessionStore>,
    pub api: ApiClient,
    pub worker: Option<Arc<CacheWorker>>,
}

impl AppState {
    /// Builds the client stack. The cache worker installs and activates
    /// here; after a failed install the worker stays registered and
    /// serves whatever earlier generations are on disk, or nothing.
    pub async fn bootstrap(config: Config, data_dir: PathBuf) -> ClientResult<Self> {
        let session = Arc::new(SessionStore::open(&data_dir)?);

        let worker = CacheWorker::register(&config.server, &config.cache, &data_dir)?;
        if let Some(worker) = &worker {
            if let Err(e) = worker.start().await {
                warn!(error = %e, "cache worker did not come up; continuing without it");
            }
        }

        let mut api = ApiClient::new(&config.server, session.clone())?;
        if let Some(worker) = &worker {
            api = api.with_worker(worker.clone());
        }

        Ok(Self {
            config,
            data_dir,
            session,
            api,
            worker,
        })
    }

    /// Best-effort push subscription; failures are logged, never fatal.
    pub async fn subscribe_push(&self) {
        let registrar = match PushRegistrar::new(self.api.clone(), &self.config.push, &self.data_dir)
        {
            Ok(registrar) => registrar,
            Err(e) => {
                warn!(error = %e, "push registrar unavailable");
                return;
            }
        };
        if let Err(e) = registrar.subscribe(self.worker.as_ref()).await {
            warn!(error = %e, "push subscription failed");
        }
    }
}
