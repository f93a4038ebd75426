//! Scripted transport for exercising the session and interceptor in-process.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{ClientError, Result};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub bearer: Option<String>,
}

/// Answers each path from its own queue; an empty queue answers `200 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Result<ApiResponse>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn reply(&self, path: &str, status: StatusCode, body: &str) {
        self.push(path, Ok(ApiResponse::new(status, body)));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.push(path, Err(ClientError::Transport(message.into())));
    }

    fn push(&self, path: &str, reply: Result<ApiResponse>) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            path: request.path.clone(),
            bearer: bearer.map(str::to_string),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.replies
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(ApiResponse::new(StatusCode::OK, "{}")))
    }
}
