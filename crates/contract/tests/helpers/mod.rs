//! Shared helpers for integration tests
//!
//! Spawns an in-process stub of the content service on a random local port.
//! The stub keeps rows in memory and mirrors the observed service contract:
//! 400 with a message for missing required fields, 401 without a valid
//! bearer, 404 for unknown users and content, and 500 when a new version
//! changes `language_code`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use qbank_contract::config::HarnessConfig;
use qbank_contract::{ContentClient, QuestionType};

pub const USERNAME: &str = "author";
pub const PASSWORD: &str = "secret";

/// One request as the stub saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub encryption: Option<String>,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Default)]
struct StubData {
    next_id: u64,
    issued_tokens: Vec<String>,
    rows: HashMap<String, Vec<Map<String, Value>>>,
    /// Remaining GETs that answer 404 for a freshly created item
    pending_reads: HashMap<String, u32>,
    requests: Vec<RecordedRequest>,
}

#[derive(Clone)]
struct StubState {
    data: Arc<Mutex<StubData>>,
    read_lag: u32,
}

/// Handle for the stub content service
pub struct StubHandle {
    base_url: String,
    join: JoinHandle<()>,
    data: Arc<Mutex<StubData>>,
}

impl StubHandle {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.data.lock().requests.clone()
    }

    pub fn requests_to(&self, path_prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(path_prefix))
            .collect()
    }

    /// Harness config pointing at this stub and the repository fixtures
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig {
            base_url: self.base_url.clone(),
            fixtures_dir: fixtures_dir(),
            request_timeout_secs: 5,
            ..Default::default()
        };
        config.credentials.username = USERNAME.to_string();
        config.credentials.password = PASSWORD.to_string();
        config.verifier.interval_ms = 5;
        config
    }

    pub fn client(&self) -> ContentClient {
        ContentClient::from_config(&self.config()).expect("stub config is valid")
    }
}

impl Drop for StubHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

/// Name of the canonical valid fixture for a question type
pub fn valid_fixture(question_type: QuestionType) -> String {
    format!("{}_valid", question_type.path_segment().replace('-', "_"))
}

pub async fn spawn_stub() -> StubHandle {
    spawn_stub_with_lag(0).await
}

/// Stub whose new items stay invisible to the first `read_lag` GETs
pub async fn spawn_stub_with_lag(read_lag: u32) -> StubHandle {
    let data = Arc::new(Mutex::new(StubData::default()));
    let state = StubState {
        data: Arc::clone(&data),
        read_lag,
    };
    let app = Router::new()
        .route("/api/authX/login", post(handle_login))
        .route("/api/content/v1/questions/:qtype", post(handle_create))
        .route("/api/content/v1/questions/:qtype/:content_id", put(handle_update))
        .route("/api/content/v1/items/:content_id", get(handle_get))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
    let join = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    StubHandle { base_url, join, data }
}

/// Base URL on which nothing is listening
pub fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind unused port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn message(status: StatusCode, text: &str) -> Response {
    reply(status, json!({ "message": text }))
}

fn record(
    state: &StubState,
    method: &str,
    path: String,
    headers: &HeaderMap,
    query: HashMap<String, String>,
    body: &Value,
) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };
    state.data.lock().requests.push(RecordedRequest {
        method: method.to_string(),
        path,
        authorization: header("authorization"),
        content_type: header("content-type"),
        encryption: header("x-encryption"),
        query,
        body: body.clone(),
    });
}

fn parse_body(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return Some(Value::Null);
    }
    serde_json::from_slice(bytes).ok()
}

fn is_authorized(state: &StubState, headers: &HeaderMap) -> bool {
    let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };
    state.data.lock().issued_tokens.iter().any(|t| t == token)
}

async fn handle_login(State(state): State<StubState>, headers: HeaderMap, bytes: Bytes) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return message(StatusCode::BAD_REQUEST, "Malformed JSON body");
    };
    record(&state, "POST", "/api/authX/login".into(), &headers, HashMap::new(), &body);

    let username = body.get("username").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);
    let (Some(username), Some(password)) = (username, password) else {
        return message(StatusCode::BAD_REQUEST, "username and password are required");
    };
    if username != USERNAME {
        return message(StatusCode::NOT_FOUND, "User not found");
    }
    if password != PASSWORD {
        return message(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    let token = {
        let mut data = state.data.lock();
        let token = format!("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJhdXRob3IiLCJuIjo{}fQ.c2lnbmF0dXJl", data.issued_tokens.len());
        data.issued_tokens.push(token.clone());
        token
    };
    reply(
        StatusCode::OK,
        json!({ "message": "Login successful", "jwt": { "accessToken": token } }),
    )
}

fn missing_required(question_type: QuestionType, payload: &Map<String, Value>) -> Option<&'static str> {
    question_type
        .required_fields()
        .into_iter()
        .find(|field| payload.get(*field).map(Value::is_null).unwrap_or(true))
}

async fn handle_create(
    State(state): State<StubState>,
    Path(qtype): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return message(StatusCode::BAD_REQUEST, "Malformed JSON body");
    };
    let path = format!("/api/content/v1/questions/{}", qtype);
    record(&state, "POST", path, &headers, HashMap::new(), &body);

    if !is_authorized(&state, &headers) {
        return message(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let Ok(question_type) = qtype.parse::<QuestionType>() else {
        return message(StatusCode::NOT_FOUND, "Unknown question type");
    };
    let Some(payload) = body.as_object() else {
        return message(StatusCode::BAD_REQUEST, "Body must be an object");
    };
    if let Some(field) = missing_required(question_type, payload) {
        return message(StatusCode::BAD_REQUEST, &format!("{} is required", field));
    }
    if payload.get("question_type").and_then(Value::as_str) != Some(question_type.path_segment()) {
        return message(StatusCode::BAD_REQUEST, "question_type does not match route");
    }
    let Some(language) = payload.get("language_code").and_then(Value::as_str) else {
        return message(StatusCode::BAD_REQUEST, "language_code must be a string");
    };

    let mut data = state.data.lock();
    data.next_id += 1;
    let content_id = format!("Q{}", 100 + data.next_id);
    let content_row_id = format!("{}_{}_1", content_id, language);

    let mut row = payload.clone();
    row.insert("content_id".into(), json!(content_id));
    row.insert("content_row_id".into(), json!(content_row_id));
    row.insert("version".into(), json!(1));
    data.rows.insert(content_id.clone(), vec![row]);
    if state.read_lag > 0 {
        data.pending_reads.insert(content_id.clone(), state.read_lag);
    }

    reply(
        StatusCode::CREATED,
        json!({ "content_id": content_id, "content_row_id": content_row_id }),
    )
}

async fn handle_update(
    State(state): State<StubState>,
    Path((qtype, content_id)): Path<(String, String)>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let Some(body) = parse_body(&bytes) else {
        return message(StatusCode::BAD_REQUEST, "Malformed JSON body");
    };
    let path = format!("/api/content/v1/questions/{}/{}", qtype, content_id);
    record(&state, "PUT", path, &headers, HashMap::new(), &body);

    if !is_authorized(&state, &headers) {
        return message(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let Some(create_new_version) = body.get("create_new_version").and_then(Value::as_bool) else {
        return message(StatusCode::BAD_REQUEST, "create_new_version is required");
    };
    let Some(details) = body.get("content_details").and_then(Value::as_object) else {
        return message(StatusCode::BAD_REQUEST, "content_details is required");
    };

    let mut data = state.data.lock();
    let Some(rows) = data.rows.get_mut(&content_id) else {
        return message(StatusCode::NOT_FOUND, "Content not found");
    };
    let Some(latest) = rows.last().cloned() else {
        return message(StatusCode::NOT_FOUND, "Content not found");
    };
    let current_language = latest.get("language_code").and_then(Value::as_str).unwrap_or("en").to_string();

    if create_new_version {
        let language = details
            .get("language_code")
            .and_then(Value::as_str)
            .unwrap_or(&current_language)
            .to_string();
        if language != current_language {
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
        let version = rows.len() + 1;
        let row_id = format!("{}_{}_{}", content_id, language, version);
        let mut row = latest.clone();
        for (k, v) in details {
            row.insert(k.clone(), v.clone());
        }
        row.insert("content_row_id".into(), json!(row_id));
        row.insert("version".into(), json!(version));
        rows.push(row);
        return reply(
            StatusCode::OK,
            json!({ "message": "New version created", "content_id": content_id, "content_row_id": row_id }),
        );
    }

    let target = details
        .get("content_row_id")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .or_else(|| latest.get("content_row_id").and_then(Value::as_str).map(|s| s.to_string()));
    let Some(row) = rows
        .iter_mut()
        .find(|r| r.get("content_row_id").and_then(Value::as_str) == target.as_deref())
    else {
        return message(StatusCode::NOT_FOUND, "Row not found");
    };
    let row_id = row.get("content_row_id").cloned().unwrap_or(Value::Null);
    for (k, v) in details {
        if k != "content_row_id" {
            row.insert(k.clone(), v.clone());
        }
    }
    reply(
        StatusCode::OK,
        json!({ "message": "Question updated", "content_id": content_id, "content_row_id": row_id }),
    )
}

async fn handle_get(
    State(state): State<StubState>,
    Path(content_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/api/content/v1/items/{}", content_id);
    record(&state, "GET", path, &headers, query.clone(), &Value::Null);

    if !is_authorized(&state, &headers) {
        return message(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let mut data = state.data.lock();
    if let Some(remaining) = data.pending_reads.get_mut(&content_id) {
        if *remaining > 0 {
            *remaining -= 1;
            return message(StatusCode::NOT_FOUND, "Content not found");
        }
    }
    let Some(rows) = data.rows.get(&content_id) else {
        return message(StatusCode::NOT_FOUND, "Content not found");
    };

    let languages: Option<Vec<&str>> = query.get("languages").map(|l| l.split(',').collect());
    let rows: Vec<Value> = rows
        .iter()
        .filter(|row| match &languages {
            Some(langs) => row
                .get("language_code")
                .and_then(Value::as_str)
                .map(|l| langs.contains(&l))
                .unwrap_or(false),
            None => true,
        })
        .map(|row| Value::Object(row.clone()))
        .collect();
    reply(StatusCode::OK, Value::Array(rows))
}
