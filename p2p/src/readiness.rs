//! Cluster readiness barriers

use crate::message::routes;
use crate::peer::PeerDirectory;
use async_trait::async_trait;
use binvote_core::{BinvoteError, BinvoteResult, ProcessId, ReadinessGate};
use futures::future::join_all;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::trace;

/// Probes `/status` on every process.
///
/// Any HTTP answer counts, including the error a faulty process returns:
/// the question is whether the process is listening, not whether it is
/// healthy.
pub struct HttpReadiness {
    directory: PeerDirectory,
    client: Client,
}

impl HttpReadiness {
    pub fn new(directory: PeerDirectory, timeout: Duration) -> BinvoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BinvoteError::NetworkError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { directory, client })
    }

    async fn probe(&self, id: ProcessId) -> bool {
        let url = match self.directory.url(id, routes::STATUS) {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self.client.get(&url).send().await {
            Ok(_) => true,
            Err(e) => {
                trace!("Process {} not reachable yet: {}", id, e);
                false
            }
        }
    }
}

#[async_trait]
impl ReadinessGate for HttpReadiness {
    async fn is_cluster_ready(&self) -> bool {
        let probes = ProcessId::all(self.directory.node_count()).map(|id| self.probe(id));
        join_all(probes).await.into_iter().all(|up| up)
    }
}

/// In-process readiness flags, one per process
#[derive(Debug)]
pub struct LocalReadiness {
    flags: Vec<AtomicBool>,
}

impl LocalReadiness {
    pub fn new(node_count: usize) -> Self {
        Self {
            flags: (0..node_count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Mark process `id` as accepting requests
    pub fn mark_ready(&self, id: ProcessId) {
        if let Some(flag) = self.flags.get(id.index()) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn mark_down(&self, id: ProcessId) {
        if let Some(flag) = self.flags.get(id.index()) {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn ready_count(&self) -> usize {
        self.flags
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }

    pub fn all_ready(&self) -> bool {
        self.ready_count() == self.flags.len()
    }
}

#[async_trait]
impl ReadinessGate for LocalReadiness {
    async fn is_cluster_ready(&self) -> bool {
        self.all_ready()
    }
}
