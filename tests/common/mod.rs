//! In-process stand-in for the management backend.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use gsm_console_lib::config::ConsoleConfig;
use gsm_console_lib::poller::PollSettings;

pub const PASSWORD: &str = "secret";
pub const ADMIN_TOKEN: &str = "tok-admin";
/// Logins for this address are answered with a 401.
pub const LOCKED_EMAIL: &str = "locked@example.com";

/// One scripted answer for `GET /servers/downloads/{id}`.
#[derive(Clone)]
pub enum Reply {
    Task(Value),
    Error(u16, Value),
}

#[derive(Default)]
pub struct Mock {
    /// Bearer the protected endpoints accept.
    pub valid_token: Mutex<Option<String>>,
    /// Authorization headers seen, in order.
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub me_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// Per task id; the last reply repeats once the script runs out.
    pub scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    pub fetches: Mutex<HashMap<String, usize>>,
    /// What `GET /servers/downloads` lists.
    pub tasks: Mutex<HashMap<String, Value>>,
    pub cancelled: Mutex<Vec<String>>,
    /// Response per install target; defaults to success without a task.
    pub install_replies: Mutex<HashMap<String, Value>>,
    /// Non-2xx answer per install target; wins over `install_replies`.
    pub install_failures: Mutex<HashMap<String, (u16, Value)>>,
    /// Request body per install target, `None` when none was sent.
    pub install_bodies: Mutex<HashMap<String, Option<Value>>>,
}

impl Mock {
    pub fn accept_token(&self, token: Option<&str>) {
        *self.valid_token.lock().unwrap() = token.map(str::to_string);
    }

    pub fn script(&self, task_id: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(task_id.to_string(), replies.into());
    }

    pub fn fetches(&self, task_id: &str) -> usize {
        self.fetches.lock().unwrap().get(task_id).copied().unwrap_or(0)
    }

    pub fn on_install(&self, target: &str, reply: Value) {
        self.install_replies
            .lock()
            .unwrap()
            .insert(target.to_string(), reply);
    }

    pub fn fail_install(&self, target: &str, status: u16, body: Value) {
        self.install_failures
            .lock()
            .unwrap()
            .insert(target.to_string(), (status, body));
    }

    pub fn install_body(&self, target: &str) -> Option<Option<Value>> {
        self.install_bodies.lock().unwrap().get(target).cloned()
    }

    pub fn last_auth_header(&self) -> Option<String> {
        self.auth_headers.lock().unwrap().last().cloned().flatten()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let sent = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth_headers.lock().unwrap().push(sent.clone());
        match (&*self.valid_token.lock().unwrap(), sent) {
            (Some(valid), Some(sent)) => sent == format!("Bearer {valid}"),
            _ => false,
        }
    }
}

pub fn task_json(id: &str, status: &str, message: &str) -> Value {
    json!({
        "task_id": id,
        "task_type": "server_download",
        "status": status,
        "progress": if status == "completed" { 100.0 } else { 42.0 },
        "description": "Download L4D2 server",
        "message": message,
        "start_time": 1_700_000_000.0,
        "end_time": null,
        "duration": null,
        "total_size": 0,
        "downloaded_size": 0
    })
}

pub fn running(id: &str) -> Reply {
    Reply::Task(task_json(id, "running", ""))
}

pub fn completed(id: &str) -> Reply {
    Reply::Task(task_json(id, "completed", ""))
}

pub fn failed(id: &str, message: &str) -> Reply {
    Reply::Task(task_json(id, "failed", message))
}

fn admin() -> Value {
    json!({
        "id": 1,
        "username": "admin",
        "email": "admin@example.com",
        "steam_id": null,
        "avatar_url": null,
        "is_admin": true,
        "is_active": true
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Could not validate credentials" })),
    )
        .into_response()
}

fn parse_body(body: &Bytes) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

async fn login(State(mock): State<Arc<Mock>>, body: Bytes) -> Response {
    let body = parse_body(&body).unwrap_or(Value::Null);
    if body["email"] == LOCKED_EMAIL {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Account locked" })),
        )
            .into_response();
    }
    if body["password"] != PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Incorrect email or password" })),
        )
            .into_response();
    }
    mock.accept_token(Some(ADMIN_TOKEN));
    Json(json!({ "success": true, "user": admin(), "token": ADMIN_TOKEN })).into_response()
}

async fn register(State(mock): State<Arc<Mock>>, body: Bytes) -> Response {
    let body = parse_body(&body).unwrap_or(Value::Null);
    if body["username"] == "taken" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": [{ "loc": ["body", "username"], "msg": "Username already registered" }] })),
        )
            .into_response();
    }
    mock.accept_token(Some("tok-new"));
    let user = json!({
        "id": 2,
        "username": body["username"],
        "email": body["email"],
        "is_admin": false
    });
    Json(json!({ "success": true, "user": user, "token": "tok-new" })).into_response()
}

async fn steam_login(Query(q): Query<HashMap<String, String>>) -> Response {
    let steam_id = q.get("steam_id").cloned().unwrap_or_default();
    if steam_id == "bad" {
        return Json(json!({ "success": false, "message": "invalid id" })).into_response();
    }
    Json(json!({
        "success": true,
        "steam_id": steam_id,
        "username": "gordon",
        "avatar_url": "https://avatars.example/gordon.jpg"
    }))
    .into_response()
}

async fn me(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.me_calls.fetch_add(1, Ordering::SeqCst);
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    Json(admin()).into_response()
}

async fn logout(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.logout_calls.fetch_add(1, Ordering::SeqCst);
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "message": "Logged out" })).into_response()
}

async fn list_tasks(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    let tasks = mock.tasks.lock().unwrap().clone();
    Json(json!(tasks)).into_response()
}

async fn get_task(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    *mock.fetches.lock().unwrap().entry(id.clone()).or_default() += 1;

    let reply = {
        let mut scripts = mock.scripts.lock().unwrap();
        match scripts.get_mut(&id) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        }
    };
    match reply {
        Some(Reply::Task(task)) => {
            mock.tasks.lock().unwrap().insert(id, task.clone());
            Json(task).into_response()
        }
        Some(Reply::Error(status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(body),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Task not found" }))).into_response(),
    }
}

async fn cancel_task(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.cancelled.lock().unwrap().push(id);
    Json(json!({ "message": "Task cancelled" })).into_response()
}

async fn install(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Path(target): Path<String>,
    body: Bytes,
) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    mock.install_bodies
        .lock()
        .unwrap()
        .insert(target.clone(), parse_body(&body));
    if let Some((status, body)) = mock.install_failures.lock().unwrap().get(&target).cloned() {
        return (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(body),
        )
            .into_response();
    }
    let reply = mock
        .install_replies
        .lock()
        .unwrap()
        .get(&target)
        .cloned()
        .unwrap_or_else(|| json!({ "success": true, "message": format!("{target} ok") }));
    Json(reply).into_response()
}

async fn install_status(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "steamcmd_installed": true,
        "server_installed": false,
        "steamcmd_path": "/opt/steamcmd",
        "server_path": ""
    }))
    .into_response()
}

pub struct Backend {
    pub addr: SocketAddr,
    pub mock: Arc<Mock>,
}

impl Backend {
    pub async fn start() -> Self {
        let mock = Arc::new(Mock::default());
        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/auth/steam/login", post(steam_login))
            .route("/api/auth/me", get(me))
            .route("/api/auth/logout", post(logout))
            .route("/api/servers/downloads", get(list_tasks))
            .route("/api/servers/downloads/{id}", get(get_task).delete(cancel_task))
            .route("/api/servers/install/status", get(install_status))
            .route("/api/servers/install/{target}", post(install))
            .with_state(Arc::clone(&mock));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, mock }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn config(&self) -> ConsoleConfig {
        ConsoleConfig {
            base_url: self.base_url(),
            request_timeout_ms: 2_000,
            poll_interval_ms: 20,
            poll_timeout_ms: 2_000,
            data_dir: None,
        }
    }
}

pub fn fast_polls() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(20),
        timeout: Duration::from_secs(2),
    }
}
