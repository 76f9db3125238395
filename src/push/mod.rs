pub mod installation;
pub mod vapid;

use crate::api::types::PushSubscription;
use crate::api::ApiClient;
use crate::cache::{CacheWorker, WorkerState};
use crate::config::PushConfig;
use crate::error::{ClientError, ClientResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

pub use installation::Installation;
pub use vapid::{decode_application_server_key, DEFAULT_VAPID_PUBLIC_KEY};

pub const RELAY_SUBSCRIBE: &str = "/push/subscribe";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelaySubscribeRequest<'a> {
    application_server_key: String,
    user_visible_only: bool,
    installation_id: &'a str,
}

/// Obtains a push subscription from the relay and forwards it to the
/// backend.
///
/// Subscribing requires push to be enabled and the cache worker to be
/// activated; when either is missing the registrar logs why and backs
/// off. The flow re-sends the subscription on every startup and leaves
/// deduplication to the backend.
pub struct PushRegistrar {
    api: ApiClient,
    http: reqwest::Client,
    config: PushConfig,
    installation: Installation,
}

impl PushRegistrar {
    pub fn new(api: ApiClient, config: &PushConfig, data_dir: &Path) -> ClientResult<Self> {
        let installation = Installation::load_or_create(data_dir)?;
        Ok(Self {
            api,
            http: reqwest::Client::new(),
            config: config.clone(),
            installation,
        })
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    /// Runs the subscription flow. Returns `None` when a gate kept us
    /// from subscribing, `Some` with the relay's subscription once the
    /// backend has a copy of it.
    pub async fn subscribe(
        &self,
        worker: Option<&Arc<CacheWorker>>,
    ) -> ClientResult<Option<PushSubscription>> {
        if !self.config.enabled {
            debug!("push disabled; not subscribing");
            return Ok(None);
        }
        let Some(worker) = worker else {
            warn!("push requires the offline cache worker; not subscribing");
            return Ok(None);
        };
        if worker.state() != WorkerState::Activated {
            warn!(state = ?worker.state(), "cache worker not active; not subscribing");
            return Ok(None);
        }

        let key_b64 = self
            .config
            .vapid_public_key
            .as_deref()
            .unwrap_or(DEFAULT_VAPID_PUBLIC_KEY);
        let key = decode_application_server_key(key_b64)?;

        let subscription = self.relay_subscribe(&key).await?;
        self.api.send_subscription(&subscription).await?;
        info!(endpoint = %subscription.endpoint, "push subscription forwarded to backend");
        Ok(Some(subscription))
    }

    /// Asks the relay for a subscription. The backend brokers push
    /// itself when no separate relay is configured.
    async fn relay_subscribe(&self, key: &[u8]) -> ClientResult<PushSubscription> {
        let relay = match &self.config.relay_url {
            Some(url) => Url::parse(url)
                .map_err(|e| ClientError::BadRequest(format!("invalid relay url: {e}")))?,
            None => self.api.base().clone(),
        };
        let url = relay
            .join(RELAY_SUBSCRIBE)
            .map_err(|e| ClientError::BadRequest(format!("invalid relay url: {e}")))?;

        let resp = self
            .http
            .post(url)
            .json(&RelaySubscribeRequest {
                application_server_key: URL_SAFE_NO_PAD.encode(key),
                user_visible_only: true,
                installation_id: &self.installation.id,
            })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: "push relay refused the subscription".to_string(),
            });
        }
        Ok(resp.json().await?)
    }
}
