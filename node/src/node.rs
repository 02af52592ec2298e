//! Standalone process node

use crate::api::serve;
use binvote_consensus::{ConsensusEngine, SharedConsensus};
use binvote_core::{BinvoteError, BinvoteResult, NodeConfig, ProcessId, Value};
use binvote_p2p::{port_for, HttpReadiness, HttpTransport, PeerDirectory};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// One BINVOTE process reachable over HTTP.
///
/// Peers are expected at `base_port + j` on the configured host.
pub struct ProcessNode {
    config: NodeConfig,
    engine: SharedConsensus,
}

impl ProcessNode {
    /// Create a new node
    pub fn new(
        config: NodeConfig,
        id: ProcessId,
        initial_value: Value,
        faulty: bool,
    ) -> BinvoteResult<Self> {
        let directory = PeerDirectory::from_config(&config.network, config.consensus.node_count)?;
        let timeout = config.network.request_timeout();

        let transport = HttpTransport::new(directory.clone(), timeout)?;
        let readiness = HttpReadiness::new(directory, timeout)?;

        let engine = ConsensusEngine::new(
            id,
            initial_value,
            faulty,
            config.consensus.clone(),
            Arc::new(transport),
            Arc::new(readiness),
        )?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    /// Address this process listens on
    pub fn listen_addr(&self) -> BinvoteResult<String> {
        let port = port_for(self.config.network.base_port, self.engine.id())?;
        Ok(format!("{}:{}", self.config.network.host, port))
    }

    /// Serve the control surface until Ctrl-C.
    ///
    /// With `auto_start` the process starts consensus on its own once every
    /// peer is reachable, instead of waiting for a `start` request.
    pub async fn run(&self, auto_start: bool) -> anyhow::Result<()> {
        let addr = self.listen_addr()?;
        let listener = TcpListener::bind(&addr).await.map_err(|e| BinvoteError::BindFailed {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

        let api_engine = self.engine.clone();
        let api_config = self.config.api.clone();
        let api_handle = tokio::spawn(async move {
            if let Err(e) = serve(api_engine, listener, api_config).await {
                error!("API server error: {}", e);
            }
        });

        info!(
            "Process {} up (N={}, F={}, faulty={})",
            self.engine.id(),
            self.config.consensus.node_count,
            self.config.consensus.fault_tolerance,
            self.engine.is_faulty()
        );

        if auto_start {
            let engine = self.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.start().await {
                    warn!("Process {} could not start: {}", engine.id(), e);
                }
            });
        }

        // Wait for shutdown signal
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping process...");
            }
            Err(e) => {
                error!("Error waiting for shutdown signal: {}", e);
            }
        }

        self.engine.stop();
        api_handle.abort();

        info!("Process stopped");

        Ok(())
    }

    pub fn engine(&self) -> &SharedConsensus {
        &self.engine
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

/// Node builder for easier configuration
pub struct NodeBuilder {
    config: NodeConfig,
    id: ProcessId,
    initial_value: Value,
    faulty: bool,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            id: ProcessId::new(0),
            initial_value: Value::Undetermined,
            faulty: false,
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(mut self, id: usize) -> Self {
        self.id = ProcessId::new(id);
        self
    }

    pub fn initial_value(mut self, value: Value) -> Self {
        self.initial_value = value;
        self
    }

    pub fn faulty(mut self, faulty: bool) -> Self {
        self.faulty = faulty;
        self
    }

    pub fn cluster(mut self, node_count: usize, fault_tolerance: usize) -> Self {
        self.config.consensus.node_count = node_count;
        self.config.consensus.fault_tolerance = fault_tolerance;
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.network.host = host.to_string();
        self
    }

    pub fn base_port(mut self, port: u16) -> Self {
        self.config.network.base_port = port;
        self
    }

    pub fn build(self) -> BinvoteResult<ProcessNode> {
        ProcessNode::new(self.config, self.id, self.initial_value, self.faulty)
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
