#![allow(dead_code)]

//! In-process stand-in for the bulletin-board backend.
//!
//! Serves the REST surface, the websocket delta channel and the push
//! relay endpoint on an ephemeral port, and counts every request so
//! tests can assert which calls hit the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use mural::config::Config;

pub struct BackendState {
    pub users: Mutex<HashMap<String, (String, String)>>,
    pub posts: Mutex<Vec<Value>>,
    pub subscriptions: Mutex<Vec<Value>>,
    pub relay_requests: Mutex<Vec<Value>>,
    pub files: Mutex<HashMap<String, (Option<String>, Vec<u8>)>>,
    pub birthdays: Mutex<Vec<Value>>,
    pub vacations: Mutex<Vec<Value>>,
    pub hits: Mutex<HashMap<String, usize>>,
    pub next_post_id: AtomicUsize,
    /// When set, every bearer-checked endpoint answers 401.
    pub reject_tokens: AtomicBool,
    pub events: broadcast::Sender<String>,
}

#[derive(Clone)]
pub struct Backend {
    pub state: Arc<BackendState>,
}

pub struct TestBackend {
    pub backend: Backend,
    pub base_url: String,
}

impl TestBackend {
    /// Requests seen for a path since startup.
    pub fn hits(&self, path: &str) -> usize {
        *self
            .backend
            .state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .unwrap_or(&0)
    }

    /// Client configuration pointing at this backend.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.server.url = self.base_url.clone();
        config
    }

    pub fn post_count(&self) -> usize {
        self.backend.state.posts.lock().unwrap().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.backend.state.subscriptions.lock().unwrap().len()
    }

    /// Announces a post authored outside this client.
    pub fn announce_post(&self, title: &str, body: &str) -> Value {
        let post = self.backend.make_post(title, body, None);
        self.backend
            .state
            .posts
            .lock()
            .unwrap()
            .insert(0, post.clone());
        self.backend.broadcast("new-post", &post);
        post
    }

    /// Pushes a raw frame down the delta channel.
    pub fn send_raw_frame(&self, frame: &str) {
        let _ = self.backend.state.events.send(frame.to_string());
    }
}

impl Backend {
    fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        let mut users = HashMap::new();
        users.insert(
            "admin".to_string(),
            ("admin123".to_string(), "admin".to_string()),
        );
        users.insert(
            "maria".to_string(),
            ("s3cret".to_string(), "user".to_string()),
        );
        Self {
            state: Arc::new(BackendState {
                users: Mutex::new(users),
                posts: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
                relay_requests: Mutex::new(Vec::new()),
                files: Mutex::new(HashMap::new()),
                birthdays: Mutex::new(Vec::new()),
                vacations: Mutex::new(Vec::new()),
                hits: Mutex::new(HashMap::new()),
                next_post_id: AtomicUsize::new(1),
                reject_tokens: AtomicBool::new(false),
                events,
            }),
        }
    }

    fn make_post(&self, title: &str, body: &str, image_path: Option<&str>) -> Value {
        let id = self.state.next_post_id.fetch_add(1, Ordering::SeqCst);
        json!({
            "id": format!("p-{id}"),
            "title": title,
            "body": body,
            "createdAt": chrono::Utc::now().to_rfc3339(),
            "imagePath": image_path,
            "comments": [],
            "reactions": [],
        })
    }

    fn broadcast(&self, event: &str, data: &Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        let _ = self.state.events.send(frame);
    }
}

/// Issues a token shaped like the backend's: three dot-separated
/// base64url sections, claims in the middle one.
pub fn mint_token(user_type: &str, user_id: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = json!({ "exp": exp, "tipoUsuario": user_type, "userId": user_id });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

pub fn far_future() -> i64 {
    (chrono::Utc::now() + chrono::Duration::days(30)).timestamp()
}

fn bearer_claims(headers: &HeaderMap) -> Option<Value> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ")?;
    let payload = token.split('.').nth(1)?;
    let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Starts the stub on an ephemeral port.
pub async fn spawn() -> TestBackend {
    let backend = Backend::new();
    let app = router(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestBackend {
        backend,
        base_url: format!("http://{addr}"),
    }
}

fn router(backend: Backend) -> Router {
    Router::new()
        .route("/", get(|| async { Html("<html>mural root</html>") }))
        .route(
            "/index.html",
            get(|| async { Html("<html>mural index</html>") }),
        )
        .route(
            "/manifest.json",
            get(|| async { Json(json!({ "name": "Mural" })) }),
        )
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}/reactions", post(add_reaction))
        .route("/subscription", post(store_subscription))
        .route("/push/subscribe", post(relay_subscribe))
        .route("/files", get(list_files).post(upload_file))
        .route("/files/{name}", get(download_file))
        .route("/birthdays", get(list_birthdays).post(add_birthday))
        .route("/vacations", get(list_vacations).post(add_vacation))
        .route("/ws", get(ws_upgrade))
        .layer(middleware::from_fn_with_state(backend.clone(), count_hits))
        .with_state(backend)
}

async fn count_hits(State(backend): State<Backend>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    *backend
        .state
        .hits
        .lock()
        .unwrap()
        .entry(path)
        .or_insert(0) += 1;
    next.run(req).await
}

async fn login(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    let usuario = body["usuario"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default();

    let users = backend.state.users.lock().unwrap();
    match users.get(&usuario) {
        Some((stored, user_type)) if stored == password => {
            let user_id = format!("u-{usuario}");
            Json(json!({
                "token": mint_token(user_type, &user_id, far_future()),
                "tipoUsuario": user_type,
                "userId": user_id,
            }))
            .into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, "invalid credentials").into_response(),
    }
}

async fn register(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    let usuario = body["usuario"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    if usuario.is_empty() || password.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing credentials").into_response();
    }

    let mut users = backend.state.users.lock().unwrap();
    if users.contains_key(&usuario) {
        return (StatusCode::CONFLICT, "user exists").into_response();
    }
    users.insert(usuario, (password, "user".to_string()));
    StatusCode::CREATED.into_response()
}

async fn list_posts(State(backend): State<Backend>) -> Json<Value> {
    Json(Value::Array(backend.state.posts.lock().unwrap().clone()))
}

async fn create_post(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    let title = body["title"].as_str().unwrap_or_default();
    let text = body["body"].as_str().unwrap_or_default();
    let post = backend.make_post(title, text, body["imagePath"].as_str());
    backend.state.posts.lock().unwrap().insert(0, post.clone());
    backend.broadcast("new-post", &post);
    Json(post).into_response()
}

async fn add_reaction(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if backend.state.reject_tokens.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "token revoked").into_response();
    }
    let Some(claims) = bearer_claims(&headers) else {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    };

    let mut posts = backend.state.posts.lock().unwrap();
    let Some(post) = posts.iter_mut().find(|p| p["id"].as_str() == Some(id.as_str())) else {
        return (StatusCode::NOT_FOUND, "no such post").into_response();
    };
    post["reactions"].as_array_mut().unwrap().push(json!({
        "type": body["type"],
        "userId": claims["userId"],
    }));
    let updated = post.clone();
    drop(posts);

    backend.broadcast("post-reaction-updated", &updated);
    StatusCode::OK.into_response()
}

async fn store_subscription(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.state.subscriptions.lock().unwrap().push(body);
    StatusCode::CREATED.into_response()
}

async fn relay_subscribe(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    let installation = body["installationId"].as_str().unwrap_or("anon").to_string();
    backend.state.relay_requests.lock().unwrap().push(body);
    Json(json!({
        "endpoint": format!("https://push.invalid/send/{installation}"),
        "keys": {
            "p256dh": "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM",
            "auth": "tBHItJI5svbpez7KI4CCXg"
        }
    }))
    .into_response()
}

async fn list_files(State(backend): State<Backend>) -> Json<Value> {
    let files = backend.state.files.lock().unwrap();
    let mut names: Vec<&String> = files.keys().collect();
    names.sort();
    let entries: Vec<Value> = names
        .into_iter()
        .map(|name| json!({ "name": name, "size": files[name].1.len() }))
        .collect();
    Json(Value::Array(entries))
}

async fn upload_file(State(backend): State<Backend>, mut multipart: Multipart) -> Response {
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload.bin").to_string();
        let content_type = field.content_type().map(String::from);
        let bytes = field.bytes().await.unwrap().to_vec();
        let size = bytes.len();
        backend
            .state
            .files
            .lock()
            .unwrap()
            .insert(name.clone(), (content_type, bytes));
        return Json(json!({ "name": name, "size": size })).into_response();
    }
    (StatusCode::BAD_REQUEST, "no file part").into_response()
}

async fn download_file(State(backend): State<Backend>, Path(name): Path<String>) -> Response {
    let files = backend.state.files.lock().unwrap();
    match files.get(&name) {
        Some((content_type, bytes)) => {
            let mut response = bytes.clone().into_response();
            if let Some(ct) = content_type {
                response.headers_mut().insert(
                    axum::http::header::CONTENT_TYPE,
                    ct.parse().unwrap(),
                );
            }
            response
        }
        None => (StatusCode::NOT_FOUND, "no such file").into_response(),
    }
}

async fn list_birthdays(State(backend): State<Backend>) -> Json<Value> {
    Json(Value::Array(backend.state.birthdays.lock().unwrap().clone()))
}

async fn add_birthday(State(backend): State<Backend>, Json(body): Json<Value>) -> StatusCode {
    backend.state.birthdays.lock().unwrap().push(body);
    StatusCode::CREATED
}

async fn list_vacations(State(backend): State<Backend>) -> Json<Value> {
    Json(Value::Array(backend.state.vacations.lock().unwrap().clone()))
}

async fn add_vacation(State(backend): State<Backend>, Json(body): Json<Value>) -> StatusCode {
    backend.state.vacations.lock().unwrap().push(body);
    StatusCode::CREATED
}

async fn ws_upgrade(State(backend): State<Backend>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| feed_events(socket, backend))
}

async fn feed_events(mut socket: WebSocket, backend: Backend) {
    let mut events = backend.state.events.subscribe();
    loop {
        tokio::select! {
            frame = events.recv() => match frame {
                Ok(frame) => {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}
