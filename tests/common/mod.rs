//! Shared test harness: a stub siren-net backend served by axum on a random
//! port, plus a console fixture wired against it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

use siren_console::api::ApiClient;
use siren_console::config::{ApiConfig, MetricsConfig, SessionConfig, validate_base_url};
use siren_console::session::SessionStore;

/// Token issued by the stub's login endpoint and accepted everywhere else.
pub const VALID_TOKEN: &str = "tok_test_12345";
pub const GOOD_PASSWORD: &str = "secret";

/// Backend fixture data plus request-recording state.
#[derive(Default)]
pub struct StubState {
    pub agents: Vec<Value>,
    pub clients: HashMap<u64, Vec<Value>>,
    pub messages: HashMap<(u64, u64), Vec<Value>>,
    pub transactions: HashMap<(u64, u64), Vec<Value>>,
    /// Raw non-JSON bodies for specific transaction endpoints.
    pub transactions_raw: HashMap<(u64, u64), String>,
    /// Per-agent artificial latency on the messages endpoint.
    pub messages_delay_ms: HashMap<u64, u64>,
    /// When set, the protected probe rejects even the valid token.
    pub probe_rejects: AtomicBool,
    /// Authorization header values seen on authenticated endpoints.
    pub seen_auth: Mutex<Vec<Option<String>>>,
}

fn record_auth(state: &StubState, headers: &HeaderMap) -> Option<String> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.seen_auth.lock().unwrap().push(auth.clone());
    auth
}

fn authorize(state: &StubState, headers: &HeaderMap) -> Result<(), Response> {
    let auth = record_auth(state, headers);
    if auth.as_deref() == Some(format!("Bearer {VALID_TOKEN}").as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid token"})),
        )
            .into_response())
    }
}

async fn login(Json(body): Json<Value>) -> Response {
    if body.get("password").and_then(Value::as_str) == Some(GOOD_PASSWORD) {
        Json(json!({ "token": VALID_TOKEN })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid credentials"})),
        )
            .into_response()
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body.get("username").and_then(Value::as_str) == Some("taken") {
        (
            StatusCode::CONFLICT,
            Json(json!({"error": "user already exists"})),
        )
            .into_response()
    } else {
        Json(json!({})).into_response()
    }
}

async fn probe(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    if state.probe_rejects.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "session revoked"})),
        )
            .into_response();
    }
    Json(json!({})).into_response()
}

async fn agents(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    Json(Value::Array(state.agents.clone())).into_response()
}

async fn clients(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(agent_id): Path<u64>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    Json(Value::Array(
        state.clients.get(&agent_id).cloned().unwrap_or_default(),
    ))
    .into_response()
}

async fn messages(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((agent_id, client_id)): Path<(u64, u64)>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    if let Some(delay) = state.messages_delay_ms.get(&agent_id) {
        tokio::time::sleep(Duration::from_millis(*delay)).await;
    }
    Json(Value::Array(
        state
            .messages
            .get(&(agent_id, client_id))
            .cloned()
            .unwrap_or_default(),
    ))
    .into_response()
}

async fn transactions(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((agent_id, client_id)): Path<(u64, u64)>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    if let Some(raw) = state.transactions_raw.get(&(agent_id, client_id)) {
        return ([(header::CONTENT_TYPE, "text/plain")], raw.clone()).into_response();
    }
    Json(Value::Array(
        state
            .transactions
            .get(&(agent_id, client_id))
            .cloned()
            .unwrap_or_default(),
    ))
    .into_response()
}

async fn ask(Json(body): Json<Value>) -> Response {
    let prompt = body.get("prompt").and_then(Value::as_str).unwrap_or_default();
    Json(json!({
        "model": "deepseek",
        "response": format!("<think>weighing the transcript</think>Echo: {prompt}"),
        "total_duration": 1234,
    }))
    .into_response()
}

async fn generate(Json(_body): Json<Value>) -> Response {
    Json(json!({ "images": ["aGVsbG8="] })).into_response()
}

fn is_bind_permission_error(err: &std::io::Error) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.kind() == std::io::ErrorKind::PermissionDenied
}

/// Start the stub backend on a random port. Returns `None` in sandboxes
/// that forbid binding sockets.
pub async fn start_backend(state: Arc<StubState>) -> Option<SocketAddr> {
    let router = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/protected/", get(probe))
        .route("/agents", get(agents))
        .route("/clients/agent/{agent_id}", get(clients))
        .route(
            "/messages/agent/{agent_id}/client/{client_id}",
            get(messages),
        )
        .route(
            "/transactions/agent/{agent_id}/client/{client_id}",
            get(transactions),
        )
        .route("/llm/ask", post(ask))
        .route("/sd/generate", post(generate))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("Failed to bind stub backend: {e:?}"),
    };
    let addr = listener.local_addr().expect("listener has a local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub backend serves");
    });

    Some(addr)
}

/// A console's core wired against the stub backend.
pub struct Console {
    pub store: Arc<SessionStore>,
    pub api: Arc<ApiClient>,
    pub api_config: ApiConfig,
    pub session_config: SessionConfig,
}

pub async fn console(addr: SocketAddr, dir: &std::path::Path) -> Console {
    let api_config = ApiConfig {
        base_url: validate_base_url(&format!("http://{addr}"), "test").unwrap(),
        timeout: Duration::from_secs(5),
    };
    let session_config = SessionConfig {
        session_path: dir.join("session.json"),
        banner_ttl: Duration::from_secs(8),
    };
    let store = Arc::new(SessionStore::open(&api_config, &session_config).await);
    let api = Arc::new(ApiClient::new(&api_config, Arc::clone(&store)));
    Console {
        store,
        api,
        api_config,
        session_config,
    }
}

pub fn default_thresholds() -> MetricsConfig {
    MetricsConfig::default()
}
