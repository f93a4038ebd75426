//! In-process stand-in for the chat backend: the REST routes the client
//! calls plus the realtime socket, bound to an ephemeral loopback port.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use url::Url;

use parlor_client::{ChatClient, MemoryStore, Navigator, ReqwestTransport, SessionManager};

pub const PASSWORD: &str = "secret";
const WAIT: Duration = Duration::from_secs(5);

pub enum Push {
    Frame(String),
    Close,
}

struct Backend {
    actions: mpsc::UnboundedSender<Value>,
    pushes: Mutex<mpsc::UnboundedReceiver<Push>>,
    refresh_calls: AtomicUsize,
    rooms_calls: AtomicUsize,
    refresh_fails: AtomicBool,
    rooms_fail: AtomicBool,
}

pub struct FakeBackend {
    pub origin: Url,
    state: Arc<Backend>,
    actions: mpsc::UnboundedReceiver<Value>,
    pushes: mpsc::UnboundedSender<Push>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let (actions_tx, actions) = mpsc::unbounded_channel();
        let (pushes, pushes_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Backend {
            actions: actions_tx,
            pushes: Mutex::new(pushes_rx),
            refresh_calls: AtomicUsize::new(0),
            rooms_calls: AtomicUsize::new(0),
            refresh_fails: AtomicBool::new(false),
            rooms_fail: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/api/user/login", post(login))
            .route("/api/user/register", post(register))
            .route("/api/user/logout", post(logout))
            .route("/api/user/refresh-token", post(refresh))
            .route("/api/message/get_rooms", get(get_rooms))
            .route("/api/message/create_room", post(create_room))
            .route("/api/message/online", get(online))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            origin: Url::parse(&format!("http://{}", addr)).unwrap(),
            state,
            actions,
            pushes,
        }
    }

    pub fn session(&self, navigator: Arc<dyn Navigator>) -> SessionManager {
        let transport = ReqwestTransport::new(self.origin.clone()).unwrap();
        SessionManager::builder(Arc::new(MemoryStore::new()), Arc::new(transport))
            .navigator(navigator)
            .build()
    }

    pub fn chat(&self, session: SessionManager) -> ChatClient {
        ChatClient::for_origin(&self.origin, session).unwrap()
    }

    /// Next action the client wrote to the socket.
    pub async fn next_action(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.actions.recv())
            .await
            .expect("timed out waiting for a client action")
            .expect("backend gone")
    }

    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.pushes.send(Push::Frame(frame.into()));
    }

    pub fn close_socket(&self) {
        let _ = self.pushes.send(Push::Close);
    }

    pub fn fail_refresh(&self) {
        self.state.refresh_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_rooms(&self) {
        self.state.rooms_fail.store(true, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn rooms_calls(&self) -> usize {
        self.state.rooms_calls.load(Ordering::SeqCst)
    }
}

pub fn new_message(id: &str, room: &str, content: &str) -> String {
    json!({
        "type": "new_message",
        "id": id,
        "author_id": "2",
        "author_name": "bob",
        "content": content,
        "created_at": "2024-01-01 10:00:00",
        "chatroom_id": room,
    })
    .to_string()
}

pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out")
}

// -- Routes --

fn user_body(user_id: &str, username: &str) -> Value {
    json!({ "id": "17", "user_id": user_id, "username": username })
}

fn with_cookie(value: &str, body: Value) -> Response {
    ([(SET_COOKIE, format!("access={}; Path=/", value))], Json(body)).into_response()
}

async fn login(Json(form): Json<Value>) -> Response {
    if form["password"] != PASSWORD {
        return (StatusCode::UNAUTHORIZED, "invalid credentials").into_response();
    }
    let user_id = form["user_id"].as_str().unwrap_or_default();
    // Issued already stale so the first protected call has to refresh.
    with_cookie("stale", user_body(user_id, "alice"))
}

async fn register(Json(form): Json<Value>) -> Response {
    let user_id = form["user_id"].as_str().unwrap_or_default();
    let username = form["username"].as_str().unwrap_or_default();
    with_cookie("fresh", user_body(user_id, username))
}

async fn logout() -> Response {
    with_cookie("gone", json!({}))
}

async fn refresh(State(backend): State<Arc<Backend>>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if backend.refresh_fails.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "refresh expired").into_response();
    }
    with_cookie("fresh", json!({}))
}

fn has_fresh_cookie(headers: &HeaderMap) -> bool {
    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(';').any(|c| c.trim() == "access=fresh"))
}

async fn get_rooms(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.rooms_calls.fetch_add(1, Ordering::SeqCst);
    if backend.rooms_fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "db down").into_response();
    }
    if !has_fresh_cookie(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    // Raw body, so the client sees keys out of numeric order.
    (
        [("content-type", "application/json")],
        r#"{"room_ids":{"30":"general","4":"random","12":"dev"}}"#,
    )
        .into_response()
}

async fn create_room(headers: HeaderMap, Json(form): Json<Value>) -> Response {
    if !has_fresh_cookie(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let room_id = if form.get("room_name").is_some() { "8" } else { "9" };
    Json(json!({ "room_id": room_id })).into_response()
}

async fn online(State(backend): State<Arc<Backend>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, backend))
}

async fn serve_socket(socket: WebSocket, backend: Arc<Backend>) {
    let (mut sender, mut receiver) = socket.split();
    let mut pushes = backend.pushes.lock().await;

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        let _ = backend.actions.send(value);
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            push = pushes.recv() => match push {
                Some(Push::Frame(text)) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Push::Close) | None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}
