//! In-process fake backend for integration tests: an axum router on 127.0.0.1:0 that
//! records every call and serves scripted sessions, histories, streams, and documents.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use haven::api::ApiClient;
use haven::auth::{AuthRecord, AuthSession};

#[derive(Default)]
pub struct MockState {
    /// One entry per handled call, e.g. "create_session", "stream:s1".
    pub log: Vec<String>,
    pub sessions: Vec<Value>,
    pub histories: HashMap<String, Value>,
    /// Body pieces of the chat stream, sent as separate writes.
    pub stream_chunks: Vec<String>,
    /// When set, the stream waits for this before sending its second piece.
    pub hold: Option<Arc<Notify>>,
    pub stream_status: Option<StatusCode>,
    /// Break the connection after the first piece.
    pub stream_breaks: bool,
    pub documents: Vec<Value>,
    pub upload_bodies: Vec<String>,
    pub fail_upload: Option<String>,
    pub fail_doc_delete: bool,
    pub fail_session_delete: bool,
    pub chunking_requests: Vec<Value>,
    pub next_id: u32,
}

pub type Shared = Arc<Mutex<MockState>>;

pub fn state() -> Shared {
    Arc::new(Mutex::new(MockState::default()))
}

pub fn log(state: &Shared) -> Vec<String> {
    state.lock().unwrap().log.clone()
}

fn record(state: &Shared, entry: impl Into<String>) {
    state.lock().unwrap().log.push(entry.into());
}

/// Start the fake backend and return its base URL.
pub async fn spawn(state: Shared) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    format!("http://{}", addr)
}

pub fn auth() -> AuthSession {
    AuthSession::new(
        AuthRecord {
            user_id: "7".into(),
            username: "robin".into(),
            token: "tok".into(),
        },
        "mental_health",
    )
}

pub fn api(base_url: &str) -> ApiClient {
    ApiClient::new(Some(base_url.to_string())).with_token(Some("tok".to_string()))
}

pub fn content_line(text: &str) -> String {
    format!(
        "data: {}\r\n\r\n",
        json!({"type": "content", "content": text})
    )
}

pub fn done_line(text: &str) -> String {
    format!(
        "data: {}\r\n\r\nevent: end\r\ndata: [END]\r\n\r\n",
        json!({"type": "done", "content": text})
    )
}

pub fn session(id: &str, title: &str, updated_at: &str) -> Value {
    json!({
        "id": 1,
        "session_id": id,
        "user_id": 7,
        "agent_type": "mental_health",
        "title": title,
        "created_at": "2024-01-01T00:00:00",
        "updated_at": updated_at
    })
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/chat/sessions", get(list_sessions).post(create_session))
        .route("/api/v1/chat/sessions/:id", axum::routing::delete(delete_session))
        .route("/api/v1/chat/sessions/:id/messages", get(history))
        .route("/api/v1/chat/stream", post(stream))
        .route("/api/v1/chat/messages", post(plain_message))
        .route("/api/v1/mental-health-rag/documents", get(list_documents))
        .route(
            "/api/v1/mental-health-rag/documents/:id",
            get(document_chunks).delete(delete_document),
        )
        .route("/api/v1/mental-health-rag/upload", post(upload))
        .route("/api/v1/mental-health-rag/search", get(search))
        .route(
            "/api/v1/mental-health-rag/search-by-category",
            get(search_by_category),
        )
        .route("/api/v1/mental-health-rag/categories", get(categories))
        .route("/api/v1/mental-health-rag/stats", get(stats))
        .route(
            "/api/v1/mental-health-rag/chunking-strategies",
            get(chunking_strategies),
        )
        .route("/api/test-chunking", post(test_chunking))
        .route("/agent-tools/", get(list_tools))
        .route("/agent-tools/execute", post(execute_tool))
        .route("/api/v1/mental-health/coping-strategies", post(coping))
        .route("/api/v1/mental-health/resources", get(resources))
        .with_state(state)
}

fn user_record(username: &Value) -> Response {
    Json(json!({
        "user_id": 7,
        "username": username,
        "email": "robin@example.com",
        "token": "tok"
    }))
    .into_response()
}

async fn login(State(s): State<Shared>, Json(body): Json<Value>) -> Response {
    record(&s, "login");
    if body["password"] == "right" {
        user_record(&body["username"])
    } else if body["password"] == "silent" {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Incorrect username or password"})),
        )
            .into_response()
    }
}

async fn register(State(s): State<Shared>, Json(body): Json<Value>) -> Response {
    record(
        &s,
        format!("register:{}", body["invite_code"].as_str().unwrap_or_default()),
    );
    if body["invite_code"] == "welcome" {
        user_record(&body["username"])
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "invite code rejected"})),
        )
            .into_response()
    }
}

async fn list_sessions(State(s): State<Shared>) -> Json<Value> {
    record(&s, "list_sessions");
    let sessions = s.lock().unwrap().sessions.clone();
    Json(json!({ "sessions": sessions }))
}

async fn create_session(
    State(s): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut st = s.lock().unwrap();
    st.next_id += 1;
    let id = format!("s{}", st.next_id);
    st.log.push("create_session".to_string());
    let created = json!({
        "session_id": id,
        "user_id": q.get("user_id").cloned().unwrap_or_default(),
        "agent_type": q.get("agent_type").cloned().unwrap_or_default(),
        "title": q.get("title").cloned().unwrap_or_default(),
        "created_at": "2030-01-01T00:00:00",
        "updated_at": "2030-01-01T00:00:00"
    });
    st.sessions.insert(0, created.clone());
    Json(created)
}

async fn delete_session(State(s): State<Shared>, Path(id): Path<String>) -> Response {
    let mut st = s.lock().unwrap();
    st.log.push(format!("delete_session:{}", id));
    if st.fail_session_delete {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "database locked"})),
        )
            .into_response();
    }
    st.sessions.retain(|v| v["session_id"] != id.as_str());
    Json(json!({"success": true})).into_response()
}

async fn history(State(s): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    let mut st = s.lock().unwrap();
    st.log.push(format!("history:{}", id));
    Json(
        st.histories
            .get(&id)
            .cloned()
            .unwrap_or_else(|| json!({"messages": []})),
    )
}

async fn stream(State(s): State<Shared>, Json(body): Json<Value>) -> Response {
    let (chunks, hold, status, breaks) = {
        let mut st = s.lock().unwrap();
        st.log.push(format!(
            "stream:{}",
            body["session_id"].as_str().unwrap_or_default()
        ));
        (
            st.stream_chunks.clone(),
            st.hold.clone(),
            st.stream_status,
            st.stream_breaks,
        )
    };
    if let Some(status) = status {
        return (status, Json(json!({"detail": "model unavailable"}))).into_response();
    }
    let pieces = futures_util::stream::unfold(
        (chunks.into_iter(), 0usize, hold, breaks),
        |(mut it, i, hold, breaks)| async move {
            if i == 1 {
                if breaks {
                    // let the first piece reach the client before the connection drops
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let err = std::io::Error::new(std::io::ErrorKind::Other, "backend crashed");
                    return Some((Err(err), (it, usize::MAX, hold, false)));
                }
                if let Some(h) = &hold {
                    h.notified().await;
                }
            }
            if i == usize::MAX {
                return None;
            }
            let next = it.next()?;
            tokio::time::sleep(Duration::from_millis(5)).await;
            Some((Ok::<_, std::io::Error>(next), (it, i + 1, hold, breaks)))
        },
    );
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(pieces),
    )
        .into_response()
}

async fn plain_message(State(s): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    record(
        &s,
        format!("message:{}", body["session_id"].as_str().unwrap_or_default()),
    );
    Json(json!({
        "user_message": {"content": body["message"]},
        "ai_message": {"content": "plain reply", "created_at": "2024-01-01T00:00:00"}
    }))
}

async fn list_documents(State(s): State<Shared>) -> Json<Value> {
    let mut st = s.lock().unwrap();
    st.log.push("list_documents".to_string());
    Json(json!({ "documents": st.documents }))
}

async fn upload(State(s): State<Shared>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body).to_string();
    let name = text
        .split("filename=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default()
        .to_string();
    let mut st = s.lock().unwrap();
    st.log.push(format!("upload:{}", name));
    st.upload_bodies.push(text);
    if st.fail_upload.as_deref() == Some(name.as_str()) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "could not parse file"})),
        )
            .into_response();
    }
    st.next_id += 1;
    let doc = json!({
        "doc_id": format!("d{}", st.next_id),
        "filename": name,
        "file_type": "txt",
        "categories": ["general"],
        "chunking_strategy": "semantic",
        "total_chunks": 2,
        "created_at": "2024-01-01T00:00:00"
    });
    st.documents.push(doc.clone());
    Json(json!({"success": true, "document": doc})).into_response()
}

async fn document_chunks(State(s): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    record(&s, format!("chunks:{}", id));
    Json(json!({
        "doc_id": id,
        "chunks": [
            {"chunk_id": 0, "text": "first part", "length": 10, "word_count": 2, "created_at": "2024-01-01T00:00:00", "mode": "sentences"},
            {"chunk_id": 1, "text": "second part", "length": 11, "word_count": 2, "created_at": "2024-01-01T00:00:00", "mode": "sentences"}
        ]
    }))
}

async fn delete_document(State(s): State<Shared>, Path(id): Path<String>) -> Response {
    let mut st = s.lock().unwrap();
    st.log.push(format!("delete_document:{}", id));
    if st.fail_doc_delete {
        return (StatusCode::INTERNAL_SERVER_ERROR, "vector store offline").into_response();
    }
    st.documents.retain(|d| d["doc_id"] != id.as_str());
    Json(json!({"success": true})).into_response()
}

async fn search(
    State(s): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut keys: Vec<&String> = q.keys().collect();
    keys.sort();
    record(
        &s,
        format!(
            "search:{}",
            keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",")
        ),
    );
    let query = q.get("query").cloned().unwrap_or_default();
    Json(json!({
        "query": query,
        "results": [
            {"id": "c1", "text": format!("about {}", query), "metadata": {"category": "sleep"}, "similarity": 0.91, "distance": 0.09}
        ]
    }))
}

async fn search_by_category(
    State(s): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let category = q.get("category").cloned().unwrap_or_default();
    record(
        &s,
        format!(
            "search_by_category:{}:{}",
            category,
            q.get("top_k").map(String::as_str).unwrap_or("-")
        ),
    );
    Json(json!({
        "category": category,
        "results": [
            {"id": "c7", "text": format!("{} tips", category), "metadata": {"category": category}}
        ]
    }))
}

async fn categories(State(s): State<Shared>) -> Json<Value> {
    record(&s, "categories");
    Json(json!({"categories": ["anxiety", "sleep"]}))
}

async fn stats(State(s): State<Shared>) -> Json<Value> {
    let mut st = s.lock().unwrap();
    st.log.push("stats".to_string());
    Json(json!({"total_documents": st.documents.len(), "total_chunks": 12}))
}

async fn chunking_strategies(State(s): State<Shared>) -> Json<Value> {
    record(&s, "chunking_strategies");
    Json(json!({
        "strategies": {
            "semantic": {"name": "Semantic", "default_chunk_size": 520}
        }
    }))
}

async fn test_chunking(State(s): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    s.lock().unwrap().chunking_requests.push(body.clone());
    let text = body["text"].as_str().unwrap_or_default();
    if text == "fallback" {
        return Json(json!({
            "error": "Enhanced chunking not available",
            "fallback_message": "Using basic chunking strategy",
            "available_strategies": ["fixed_length"]
        }));
    }
    Json(json!({
        "input_text_length": text.len(),
        "chunking_strategy": body["chunking_strategy"],
        "chunk_count": 1,
        "chunks": [
            {"id": 0, "text": text, "length": text.len(), "word_count": text.split_whitespace().count(), "chunk_type": "paragraph", "start_index": 0, "end_index": text.len()}
        ],
        "statistics": {
            "avg_chunk_length": text.len() as f64,
            "min_chunk_length": text.len(),
            "max_chunk_length": text.len(),
            "chunk_types": {"paragraph": 1}
        }
    }))
}

async fn list_tools(State(s): State<Shared>) -> Json<Value> {
    record(&s, "list_tools");
    Json(json!({
        "tools": [{
            "name": "mood_score",
            "description": "Score today's mood",
            "parameters": {
                "type": "object",
                "properties": {
                    "score": {"type": "integer", "description": "1-10"},
                    "feeling": {"type": "string", "enum": ["calm", "tense"]}
                },
                "required": ["score"]
            }
        }]
    }))
}

async fn execute_tool(State(s): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    record(
        &s,
        format!("execute:{}", body["tool_name"].as_str().unwrap_or_default()),
    );
    Json(json!({"success": true, "result": body["parameters"]}))
}

async fn coping(
    State(s): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    record(&s, "coping");
    Json(json!({"emotion": q.get("emotion"), "intensity": q.get("intensity")}))
}

async fn resources(State(s): State<Shared>) -> Json<Value> {
    record(&s, "resources");
    Json(json!({"hotlines": ["988"]}))
}
