//! HTTP vote transport

use crate::message::routes;
use crate::peer::PeerDirectory;
use async_trait::async_trait;
use binvote_core::{BinvoteError, BinvoteResult, ProcessId, Transport, Value, VoteMessage};
use futures::future::join_all;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of sending one vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The peer recorded or ignored the vote
    Accepted,
    /// The peer refused it (stopped or faulty)
    Refused,
}

/// Sends votes to peers with `POST /message`
pub struct HttpTransport {
    directory: PeerDirectory,
    client: Client,
}

impl HttpTransport {
    pub fn new(directory: PeerDirectory, timeout: Duration) -> BinvoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BinvoteError::NetworkError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { directory, client })
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Send a single vote to `target`
    pub async fn send(&self, target: ProcessId, message: &VoteMessage) -> BinvoteResult<Delivery> {
        let url = self.directory.url(target, routes::MESSAGE)?;
        let response = self
            .client
            .post(&url)
            .json(message)
            .send()
            .await
            .map_err(|e| BinvoteError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(Delivery::Accepted)
        } else if status.is_client_error() {
            Ok(Delivery::Refused)
        } else {
            Err(BinvoteError::NetworkError(format!(
                "process {} answered {}",
                target, status
            )))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn broadcast(&self, from: ProcessId, value: Value) {
        let message = VoteMessage { from, value };
        let sends = self.directory.peers_of(from).map(|target| {
            let message = &message;
            async move { (target, self.send(target, message).await) }
        });

        for (target, result) in join_all(sends).await {
            match result {
                Ok(Delivery::Accepted) => {}
                Ok(Delivery::Refused) => {
                    debug!("Process {} refused vote from {}", target, from);
                }
                Err(e) => {
                    warn!("Error sending message to process {}: {}", target, e);
                }
            }
        }
    }
}
