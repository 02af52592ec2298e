//! CLI Commands

use binvote_core::{ProcessId, ProcessState, ProcessStatus};
use binvote_p2p::{routes, PeerDirectory, FAULTY_BODY};
use futures::future::join_all;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// API Client for one BINVOTE process
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Get process status
    pub async fn status(&self) -> Result<ProcessStatus, ApiError> {
        let resp = self.client.get(self.url(routes::STATUS)).send().await?;
        let code = resp.status();
        let body = resp.text().await?;

        if code.is_success() {
            Ok(ProcessStatus::Live)
        } else if body.trim() == FAULTY_BODY {
            Ok(ProcessStatus::Faulty)
        } else {
            Err(ApiError::Server { status: code, body })
        }
    }

    /// Get process state
    pub async fn get_state(&self) -> Result<ProcessState, ApiError> {
        let resp = expect_success(self.client.get(self.url(routes::GET_STATE)).send().await?).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// State of the process, `None` when it cannot be read
    pub async fn state_or_unknown(&self) -> Option<ProcessState> {
        self.get_state().await.ok()
    }

    /// Ask the process to start consensus; blocks until its cluster is ready
    pub async fn start(&self) -> Result<String, ApiError> {
        let resp = expect_success(self.client.get(self.url(routes::START)).send().await?).await?;
        Ok(resp.text().await?)
    }

    pub async fn stop(&self) -> Result<String, ApiError> {
        let resp = expect_success(self.client.get(self.url(routes::STOP)).send().await?).await?;
        Ok(resp.text().await?)
    }

    /// Deliver a vote by hand. `value` is sent as is.
    pub async fn send_message(
        &self,
        from: ProcessId,
        value: serde_json::Value,
    ) -> Result<String, ApiError> {
        let body = MessageRequest { from, value };
        let resp = expect_success(
            self.client
                .post(self.url(routes::MESSAGE))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        Ok(resp.text().await?)
    }
}

async fn expect_success(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Server { status, body })
    }
}

/// Message request
#[derive(Debug, Serialize)]
pub struct MessageRequest {
    pub from: ProcessId,
    pub value: serde_json::Value,
}

/// API Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error {status}: {body}")]
    Server { status: StatusCode, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Clients for every process of a cluster
pub struct ClusterClient {
    clients: Vec<ApiClient>,
}

impl ClusterClient {
    pub fn new(directory: &PeerDirectory, timeout: Duration) -> Result<Self, ApiError> {
        let clients = ProcessId::all(directory.node_count())
            .map(|id| {
                let endpoint = directory
                    .endpoint(id)
                    .map_err(|e| ApiError::Malformed(e.to_string()))?;
                ApiClient::new(endpoint, timeout)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { clients })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn process(&self, id: ProcessId) -> Option<&ApiClient> {
        self.clients.get(id.index())
    }

    /// State of every process; unreadable states are `None`
    pub async fn states(&self) -> Vec<Option<ProcessState>> {
        join_all(self.clients.iter().map(|client| client.state_or_unknown())).await
    }

    pub async fn start_all(&self) -> Vec<Result<String, ApiError>> {
        join_all(self.clients.iter().map(|client| client.start())).await
    }

    pub async fn stop_all(&self) -> Vec<Result<String, ApiError>> {
        join_all(self.clients.iter().map(|client| client.stop())).await
    }

    pub async fn statuses(&self) -> Vec<Result<ProcessStatus, ApiError>> {
        join_all(self.clients.iter().map(|client| client.status())).await
    }
}

/// Whether a process no longer needs watching
pub fn is_settled(state: &Option<ProcessState>) -> bool {
    match state {
        // Unreachable or malformed: nothing more to learn
        None => true,
        Some(state) => state.killed || state.decided != Some(false),
    }
}

/// One row of the `watch` table
pub fn format_state(id: ProcessId, state: &Option<ProcessState>) -> String {
    match state {
        None => format!("{:>4}  unknown", id),
        Some(state) => format!(
            "{:>4}  x={:<4} decided={:<6} k={:<4} killed={}",
            id,
            display_opt(&state.value),
            display_opt(&state.decided),
            display_opt(&state.round),
            state.killed
        ),
    }
}

fn display_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

/// Parse a vote value typed on the command line.
///
/// JSON literals are sent as JSON, anything else as a string.
pub fn parse_raw_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
