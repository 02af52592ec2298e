//! Configuration types for BINVOTE

use crate::error::BinvoteError;
use crate::traits::BinvoteResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default cap on the number of rounds a process runs before giving up
pub const DEFAULT_ROUND_CAP: u32 = 50;

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Network configuration
    pub network: NetworkConfig,

    /// Consensus configuration
    pub consensus: ConsensusConfig,

    /// API configuration
    pub api: ApiConfig,

    /// Logging level
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "binvote-node".to_string(),
            network: NetworkConfig::default(),
            consensus: ConsensusConfig::default(),
            api: ApiConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> BinvoteResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BinvoteError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> BinvoteResult<Self> {
        let config: NodeConfig = serde_json::from_str(content)?;
        config.consensus.validate()?;
        Ok(config)
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host every process listens on
    pub host: String,

    /// Process `i` listens on `base_port + i`
    pub base_port: u16,

    /// Per-request timeout for peer calls in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 3000,
            request_timeout_ms: 2000,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Consensus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Number of processes in the cluster (N)
    pub node_count: usize,

    /// Number of faults to tolerate (F)
    pub fault_tolerance: usize,

    /// Maximum number of rounds before an undecided process stops
    pub round_cap: u32,

    /// Readiness polling interval in milliseconds
    pub readiness_poll_ms: u64,

    /// Quorum polling interval in milliseconds
    pub quorum_poll_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            node_count: 1,
            fault_tolerance: 0,
            round_cap: DEFAULT_ROUND_CAP,
            readiness_poll_ms: 100,
            quorum_poll_ms: 50,
        }
    }
}

impl ConsensusConfig {
    pub fn new(node_count: usize, fault_tolerance: usize) -> Self {
        Self {
            node_count,
            fault_tolerance,
            ..Default::default()
        }
    }

    /// Peer votes required before a round may be evaluated (`N - 1 - F`)
    pub fn quorum(&self) -> usize {
        self.node_count
            .saturating_sub(1)
            .saturating_sub(self.fault_tolerance)
    }

    /// Same-valued votes needed to decide when `F > 0`
    pub fn decision_threshold(&self) -> usize {
        2 * self.fault_tolerance + 1
    }

    /// Whether the `N > 3F` bound for safe decisions holds
    pub fn tolerates_faults(&self) -> bool {
        self.node_count > 3 * self.fault_tolerance
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn quorum_poll_interval(&self) -> Duration {
        Duration::from_millis(self.quorum_poll_ms)
    }

    pub fn validate(&self) -> BinvoteResult<()> {
        if self.node_count == 0 {
            return Err(BinvoteError::ConfigError(
                "node_count must be at least 1".into(),
            ));
        }
        if self.fault_tolerance >= self.node_count {
            return Err(BinvoteError::ConfigError(format!(
                "fault_tolerance {} must be below node_count {}",
                self.fault_tolerance, self.node_count
            )));
        }
        if self.readiness_poll_ms == 0 || self.quorum_poll_ms == 0 {
            return Err(BinvoteError::ConfigError(
                "polling intervals must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Enable CORS
    pub enable_cors: bool,

    /// Wrap the router in a request tracing layer
    pub enable_trace: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            enable_trace: true,
        }
    }
}
