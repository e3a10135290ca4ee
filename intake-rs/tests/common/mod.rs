//! In-process stand-in for the MailHub API, recording every call.

#![allow(dead_code)]

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use intake_rs::config::ApiConfig;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const MESSAGE_ID: u64 = 5;
pub const FIRST_FILE_ID: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(Value),
    Store { field: String, filename: String, content: Vec<u8> },
    Link { message_id: u64, file_id: u64 },
}

/// How the backend misbehaves
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub fail_create: bool,
    /// Uploads with these filenames answer 500
    pub fail_uploads: HashSet<String>,
    pub fail_links: bool,
    /// Answer creation with a body that is not the expected envelope
    pub garbage_create: bool,
}

#[derive(Clone)]
struct AppState {
    behaviour: Behaviour,
    calls: Arc<Mutex<Vec<Call>>>,
    next_file_id: Arc<Mutex<u64>>,
}

pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockBackend {
    pub async fn start(behaviour: Behaviour) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = AppState {
            behaviour,
            calls: calls.clone(),
            next_file_id: Arc::new(Mutex::new(FIRST_FILE_ID)),
        };

        let app = Router::new()
            .route("/api/v1/auth/sendOther", post(create_message))
            .route("/api/v1/auth/addFileOther", post(store_attachment))
            .route(
                "/api/v1/auth/addFileToEmailOther/:message_id/file/:file_id",
                post(link_attachment),
            )
            .route("/slow", post(slow))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, calls }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            create_message_url: format!("http://{}/api/v1/auth/sendOther", self.addr),
            store_attachment_url: format!("http://{}/api/v1/auth/addFileOther", self.addr),
            link_attachment_url: format!("http://{}/api/v1/auth/addFileToEmailOther", self.addr),
            request_timeout_secs: 5,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn stores(&self) -> Vec<(String, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Store {
                    filename, content, ..
                } => Some((filename, content)),
                _ => None,
            })
            .collect()
    }

    pub fn links(&self) -> Vec<(u64, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Link {
                    message_id,
                    file_id,
                } => Some((message_id, file_id)),
                _ => None,
            })
            .collect()
    }
}

async fn create_message(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let topic = body["topic"].clone();
    state.calls.lock().unwrap().push(Call::Create(body));

    if state.behaviour.fail_create {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": 500, "body": {"error": "database unavailable"}})),
        );
    }
    if state.behaviour.garbage_create {
        return (StatusCode::OK, Json(json!({"status": 200, "body": {}})));
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": 200,
            "body": {"email": {"id": MESSAGE_ID, "topic": topic, "readStatus": false}}
        })),
    )
}

async fn store_attachment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut failed = false;

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await.unwrap().to_vec();

        failed |= state.behaviour.fail_uploads.contains(&filename);
        state.calls.lock().unwrap().push(Call::Store {
            field: name,
            filename,
            content,
        });
    }

    if failed {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": 500, "body": {"error": "storage full"}})),
        );
    }

    let mut next = state.next_file_id.lock().unwrap();
    let file_id = *next;
    *next += 1;

    (
        StatusCode::OK,
        Json(json!({"status": 200, "body": {"FileId": file_id}})),
    )
}

async fn link_attachment(
    State(state): State<AppState>,
    Path((message_id, file_id)): Path<(u64, u64)>,
) -> (StatusCode, Json<Value>) {
    state.calls.lock().unwrap().push(Call::Link {
        message_id,
        file_id,
    });

    if state.behaviour.fail_links {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": 404, "body": {"error": "no such email"}})),
        );
    }
    (StatusCode::OK, Json(json!({"status": 200, "body": {}})))
}

async fn slow() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK
}
