pub mod types;

use crate::cache::CacheWorker;
use crate::config::ServerConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::{Role, Session, SessionStore};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

pub use types::*;

pub const LOGIN: &str = "/login";
pub const REGISTER: &str = "/register";
pub const POSTS: &str = "/posts";
pub const SUBSCRIPTION: &str = "/subscription";
pub const FILES: &str = "/files";
pub const BIRTHDAYS: &str = "/birthdays";
pub const VACATIONS: &str = "/vacations";

pub fn reactions_path(post_id: &str) -> String {
    format!("{POSTS}/{post_id}/reactions")
}

pub fn file_path(name: &str) -> String {
    format!("{FILES}/{name}")
}

/// Result of a GET, whether it came off the wire or out of a cache
/// generation.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub from_cache: bool,
}

/// Typed client for the bulletin-board backend. Requests carry the
/// bearer token whenever a session is active, GETs consult the cache
/// worker first when one is attached, and a 401 from any endpoint
/// discards the stored session.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    session: Arc<SessionStore>,
    worker: Option<Arc<CacheWorker>>,
}

impl ApiClient {
    pub fn new(config: &ServerConfig, session: Arc<SessionStore>) -> ClientResult<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| ClientError::BadRequest(format!("invalid server url: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            session,
            worker: None,
        })
    }

    pub fn with_worker(mut self, worker: Arc<CacheWorker>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> ClientResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ClientError::BadRequest(format!("invalid request path {path}: {e}")))
    }

    fn bearer(&self, req: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn require_token(&self) -> ClientResult<String> {
        self.session.token().ok_or(ClientError::Unauthorized)
    }

    async fn check(&self, resp: Response) -> ClientResult<Response> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.clear()?;
            return Err(ClientError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    /// Cache-first GET. A hit in any generation is served as-is; a miss
    /// goes to the network and is returned without being stored.
    pub async fn fetch(&self, path: &str) -> ClientResult<Fetched> {
        let url = self.url(path)?;
        if let Some(worker) = &self.worker {
            if let Some(hit) = worker.match_any("GET", url.as_str())? {
                debug!(%url, "request served from cache");
                return Ok(Fetched {
                    status: hit.status,
                    content_type: hit.content_type,
                    body: hit.body,
                    from_cache: true,
                });
            }
        }
        let resp = self.bearer(self.http.get(url)).send().await?;
        let resp = self.check(resp).await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = resp.bytes().await?;
        Ok(Fetched {
            status,
            content_type,
            body,
            from_cache: false,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let fetched = self.fetch(path).await?;
        Ok(serde_json::from_slice(&fetched.body)?)
    }

    async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> ClientResult<Response> {
        let resp = self.bearer(self.http.post(self.url(path)?)).json(body).send().await?;
        self.check(resp).await
    }

    /// Exchanges credentials for a token and stores the resulting
    /// session. The role comes from the login response, not the token.
    pub async fn login(&self, usuario: &str, password: &str) -> ClientResult<Session> {
        let resp = self
            .http
            .post(self.url(LOGIN)?)
            .json(&Credentials {
                usuario: usuario.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let resp = self.check(resp).await?;
        let login: LoginResponse = resp.json().await?;
        let session = Session {
            token: login.token,
            role: Role::from_user_type(&login.user_type),
            user_id: login.user_id,
        };
        self.session.set(session.clone())?;
        info!(role = %session.role, "logged in");
        Ok(session)
    }

    pub async fn register(&self, usuario: &str, password: &str) -> ClientResult<()> {
        self.post_json(
            REGISTER,
            &Credentials {
                usuario: usuario.to_string(),
                password: password.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn posts(&self) -> ClientResult<Vec<Post>> {
        self.get_json(POSTS).await
    }

    pub async fn create_post(&self, post: &NewPost) -> ClientResult<Post> {
        let resp = self.post_json(POSTS, post).await?;
        Ok(resp.json().await?)
    }

    /// Submits a reaction. The response body is not used; the updated
    /// post arrives over the delta channel.
    pub async fn react(&self, post_id: &str, kind: ReactionKind) -> ClientResult<()> {
        let token = self.require_token()?;
        let resp = self
            .http
            .post(self.url(&reactions_path(post_id))?)
            .bearer_auth(token)
            .json(&ReactionRequest { kind })
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    pub async fn send_subscription(&self, subscription: &PushSubscription) -> ClientResult<()> {
        self.post_json(SUBSCRIPTION, subscription).await?;
        Ok(())
    }

    pub async fn files(&self) -> ClientResult<Vec<FileEntry>> {
        self.get_json(FILES).await
    }

    pub async fn upload_file(&self, path: &Path) -> ClientResult<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ClientError::BadRequest(format!("not a file path: {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let part = multipart::Part::bytes(bytes)
            .file_name(name)
            .mime_str(mime.as_ref())?;
        let form = multipart::Form::new().part("file", part);
        let resp = self
            .bearer(self.http.post(self.url(FILES)?))
            .multipart(form)
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    pub async fn download_file(&self, name: &str) -> ClientResult<Fetched> {
        self.fetch(&file_path(name)).await
    }

    pub async fn birthdays(&self) -> ClientResult<Vec<Birthday>> {
        self.get_json(BIRTHDAYS).await
    }

    pub async fn add_birthday(&self, birthday: &Birthday) -> ClientResult<()> {
        self.post_json(BIRTHDAYS, birthday).await?;
        Ok(())
    }

    pub async fn vacations(&self) -> ClientResult<Vec<Vacation>> {
        self.get_json(VACATIONS).await
    }

    pub async fn add_vacation(&self, vacation: &Vacation) -> ClientResult<()> {
        self.post_json(VACATIONS, vacation).await?;
        Ok(())
    }
}
