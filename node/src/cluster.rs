//! In-process cluster launcher
//!
//! Runs N processes inside one runtime, each behind its own HTTP listener,
//! and wires them together through real loopback HTTP.

use crate::api::serve;
use binvote_consensus::{ConsensusEngine, SharedConsensus};
use binvote_core::{BinvoteError, BinvoteResult, NodeConfig, ProcessId, ProcessState, Value};
use binvote_p2p::{port_for, HttpTransport, LocalReadiness, PeerDirectory};
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A set of processes launched together
pub struct LocalCluster {
    engines: Vec<SharedConsensus>,
    addrs: Vec<SocketAddr>,
    readiness: Arc<LocalReadiness>,
    servers: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    /// Bind one listener per process and serve every control surface.
    ///
    /// `initial_values` must hold one value per process. With a base port
    /// of 0 every listener gets an ephemeral port.
    pub async fn launch(
        config: &NodeConfig,
        initial_values: &[Value],
        faulty: &[ProcessId],
    ) -> BinvoteResult<Self> {
        let consensus = &config.consensus;
        consensus.validate()?;

        let node_count = consensus.node_count;
        if initial_values.len() != node_count {
            return Err(BinvoteError::ConfigError(format!(
                "expected {} initial values, got {}",
                node_count,
                initial_values.len()
            )));
        }
        if let Some(bad) = faulty.iter().find(|id| id.index() >= node_count) {
            return Err(BinvoteError::InvalidProcessId {
                id: bad.index(),
                node_count,
            });
        }
        if faulty.len() > consensus.fault_tolerance {
            warn!(
                "{} faulty processes exceed the tolerated {}",
                faulty.len(),
                consensus.fault_tolerance
            );
        }
        if !consensus.tolerates_faults() {
            warn!(
                "N={} does not exceed 3F={}, decisions are not guaranteed to agree",
                node_count,
                3 * consensus.fault_tolerance
            );
        }

        let mut listeners = Vec::with_capacity(node_count);
        for id in ProcessId::all(node_count) {
            let port = match config.network.base_port {
                0 => 0,
                base => port_for(base, id)?,
            };
            let addr = format!("{}:{}", config.network.host, port);
            let listener = TcpListener::bind(&addr).await.map_err(|e| BinvoteError::BindFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
            listeners.push(listener);
        }

        let addrs = listeners
            .iter()
            .map(|listener| listener.local_addr())
            .collect::<Result<Vec<_>, _>>()?;

        let directory = PeerDirectory::from_addrs(&addrs);
        let transport = Arc::new(HttpTransport::new(
            directory,
            config.network.request_timeout(),
        )?);
        let readiness = Arc::new(LocalReadiness::new(node_count));

        let mut engines = Vec::with_capacity(node_count);
        let mut servers = Vec::with_capacity(node_count);

        for (index, listener) in listeners.into_iter().enumerate() {
            let id = ProcessId::new(index);
            let engine = Arc::new(ConsensusEngine::new(
                id,
                initial_values[index],
                faulty.contains(&id),
                consensus.clone(),
                transport.clone(),
                readiness.clone(),
            )?);

            let api_engine = engine.clone();
            let api_config = config.api.clone();
            servers.push(tokio::spawn(async move {
                if let Err(e) = serve(api_engine, listener, api_config).await {
                    error!("Process {} API server error: {}", id, e);
                }
            }));

            // The listener is already bound, so requests queue until served
            readiness.mark_ready(id);
            engines.push(engine);
        }

        info!(
            "Launched {} processes (F={}, faulty: {:?})",
            node_count, consensus.fault_tolerance, faulty
        );

        Ok(Self {
            engines,
            addrs,
            readiness,
            servers,
        })
    }

    pub fn engines(&self) -> &[SharedConsensus] {
        &self.engines
    }

    pub fn engine(&self, id: ProcessId) -> Option<&SharedConsensus> {
        self.engines.get(id.index())
    }

    /// Listening address of every process, indexed by id
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.all_ready()
    }

    /// Start consensus on every process
    pub async fn start_all(&self) -> BinvoteResult<()> {
        let results = join_all(self.engines.iter().map(|engine| engine.start())).await;
        results.into_iter().collect()
    }

    /// Poll until no healthy process is still running its round loop.
    ///
    /// Returns the final states, or a timeout error when `limit` elapses.
    pub async fn wait_for_outcome(&self, limit: Duration) -> BinvoteResult<Vec<ProcessState>> {
        let poll = self.engines.first().map(|engine| engine.config().quorum_poll_interval());
        let poll = poll.unwrap_or(Duration::from_millis(50));

        let settled = tokio::time::timeout(limit, async {
            while self.engines.iter().any(|engine| engine.is_running()) {
                tokio::time::sleep(poll).await;
            }
        })
        .await;

        match settled {
            Ok(()) => Ok(self.states()),
            Err(_) => Err(BinvoteError::Internal(format!(
                "cluster still running after {:?}",
                limit
            ))),
        }
    }

    pub fn states(&self) -> Vec<ProcessState> {
        self.engines.iter().map(|engine| engine.get_state()).collect()
    }

    /// Decided value shared by every healthy process, if they all agree
    pub fn agreed_value(&self) -> Option<Value> {
        let mut decided = self
            .engines
            .iter()
            .filter(|engine| !engine.is_faulty())
            .map(|engine| engine.get_state());

        let first = decided.next()?;
        if !first.is_decided() {
            return None;
        }
        let value = first.value?;
        decided
            .all(|state| state.is_decided() && state.value == Some(value))
            .then_some(value)
    }

    pub fn stop_all(&self) {
        for engine in &self.engines {
            engine.stop();
        }
    }

    /// Stop every process and tear down the listeners
    pub fn shutdown(self) {
        self.stop_all();
        for (index, server) in self.servers.into_iter().enumerate() {
            self.readiness.mark_down(ProcessId::new(index));
            server.abort();
        }
        info!("Cluster shut down");
    }
}

/// Repeat `values` until `node_count` values are produced
pub fn cycle_values(values: &[Value], node_count: usize) -> BinvoteResult<Vec<Value>> {
    if values.is_empty() {
        return Err(BinvoteError::ConfigError("at least one initial value is required".into()));
    }
    Ok(values.iter().copied().cycle().take(node_count).collect())
}
