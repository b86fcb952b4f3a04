//! In-process mock of the catalog backend's import endpoints
//!
//! Accepts key `secret123` and issues credential `tok-abc`. Status replies
//! walk through a scripted list, repeating the last entry.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

pub const GOOD_KEY: &str = "secret123";
pub const ISSUED_TOKEN: &str = "tok-abc";
pub const TEMPLATE_BYTES: &[u8] = b"PK\x03\x04video-template";

/// What the mock has seen
#[derive(Debug, Default)]
pub struct Recorded {
    pub verify_bodies: Vec<Value>,
    pub start_fields: Vec<HashMap<String, String>>,
    pub start_file_bytes: Vec<usize>,
    pub status_requests: Vec<String>,
    pub template_types: Vec<String>,
    pub authorization_headers: Vec<Option<String>>,
}

#[derive(Clone)]
struct MockState {
    recorded: Arc<Mutex<Recorded>>,
    statuses: Arc<Mutex<Vec<Value>>>,
}

/// Handle to a running mock backend
pub struct MockBackend {
    pub addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockBackend {
    /// Base URL including the `/api` prefix
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn with_recorded<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        f(&self.recorded.lock().unwrap())
    }
}

/// Start the mock on an ephemeral port with the given status script
pub async fn spawn_mock_backend(statuses: Vec<Value>) -> MockBackend {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let state = MockState {
        recorded: Arc::clone(&recorded),
        statuses: Arc::new(Mutex::new(statuses)),
    };

    let app = Router::new()
        .route("/api/videos/import/verify-key/", post(verify_key))
        .route("/api/videos/import/start/", post(start_import))
        .route("/api/videos/import/status/:task_id/", get(import_status))
        .route("/api/videos/import/template/", get(template))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Should bind ephemeral port");
    let addr = listener.local_addr().expect("Should have local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Mock backend failed");
    });

    MockBackend { addr, recorded }
}

fn record_auth(state: &MockState, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .recorded
        .lock()
        .unwrap()
        .authorization_headers
        .push(auth);
}

fn has_credential(headers: &HeaderMap) -> bool {
    headers
        .get("x-upload-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == ISSUED_TOKEN)
}

async fn verify_key(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_auth(&state, &headers);
    state.recorded.lock().unwrap().verify_bodies.push(body.clone());

    if body["upload_key"] == GOOD_KEY {
        Json(json!({"valid": true, "token": ISSUED_TOKEN, "message": "ok"})).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"valid": false, "message": "密钥无效"})),
        )
            .into_response()
    }
}

async fn start_import(
    State(state): State<MockState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    record_auth(&state, &headers);

    let mut fields = HashMap::new();
    let mut file_bytes = 0;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.unwrap_or_default();
            file_bytes = bytes.len();
            fields.insert(name, file_name);
        } else {
            let text = field.text().await.unwrap_or_default();
            fields.insert(name, text);
        }
    }

    let authorized = fields.get("upload_key").map(String::as_str) == Some(ISSUED_TOKEN);
    {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.start_fields.push(fields);
        recorded.start_file_bytes.push(file_bytes);
    }

    if !authorized {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "invalid upload key"})),
        )
            .into_response();
    }

    Json(json!({"task_id": "task-1", "message": "导入任务已创建"})).into_response()
}

async fn import_status(
    State(state): State<MockState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    record_auth(&state, &headers);
    state
        .recorded
        .lock()
        .unwrap()
        .status_requests
        .push(task_id.clone());

    if !has_credential(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "credential expired"})),
        )
            .into_response();
    }
    if task_id == "broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "cache unavailable"})),
        )
            .into_response();
    }

    let mut statuses = state.statuses.lock().unwrap();
    let mut body = if statuses.len() > 1 {
        statuses.remove(0)
    } else {
        statuses.first().cloned().unwrap_or_else(|| json!({"status": "pending"}))
    };
    body["task_id"] = json!(task_id);
    Json(body).into_response()
}

async fn template(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    record_auth(&state, &headers);
    let kind = params.get("type").cloned().unwrap_or_default();
    state.recorded.lock().unwrap().template_types.push(kind);

    if !has_credential(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "no key"}))).into_response();
    }
    TEMPLATE_BYTES.to_vec().into_response()
}
