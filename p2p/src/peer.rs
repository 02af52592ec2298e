//! Peer addressing

use binvote_core::{BinvoteError, BinvoteResult, NetworkConfig, ProcessId};
use std::net::SocketAddr;

/// Maps every process id of the cluster to its HTTP endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDirectory {
    endpoints: Vec<String>,
}

impl PeerDirectory {
    /// Process `i` listens on `host:base_port + i`
    pub fn with_base_port(host: &str, base_port: u16, node_count: usize) -> BinvoteResult<Self> {
        let endpoints = (0..node_count)
            .map(|i| {
                port_for(base_port, ProcessId::new(i)).map(|port| format!("http://{}:{}", host, port))
            })
            .collect::<BinvoteResult<Vec<_>>>()?;

        Ok(Self { endpoints })
    }

    pub fn from_config(config: &NetworkConfig, node_count: usize) -> BinvoteResult<Self> {
        Self::with_base_port(&config.host, config.base_port, node_count)
    }

    /// One endpoint per bound address, indexed by process id
    pub fn from_addrs(addrs: &[SocketAddr]) -> Self {
        Self {
            endpoints: addrs.iter().map(|addr| format!("http://{}", addr)).collect(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Base URL of process `id`
    pub fn endpoint(&self, id: ProcessId) -> BinvoteResult<&str> {
        self.endpoints
            .get(id.index())
            .map(String::as_str)
            .ok_or(BinvoteError::InvalidProcessId {
                id: id.index(),
                node_count: self.endpoints.len(),
            })
    }

    /// Full URL of `path` on process `id`
    pub fn url(&self, id: ProcessId, path: &str) -> BinvoteResult<String> {
        Ok(format!("{}{}", self.endpoint(id)?, path))
    }

    /// Every process except `id`
    pub fn peers_of(&self, id: ProcessId) -> impl Iterator<Item = ProcessId> {
        ProcessId::all(self.endpoints.len()).filter(move |peer| *peer != id)
    }
}

/// Port of process `id` when ports are assigned from `base_port`
pub fn port_for(base_port: u16, id: ProcessId) -> BinvoteResult<u16> {
    u16::try_from(base_port as usize + id.index()).map_err(|_| {
        BinvoteError::ConfigError(format!(
            "process {} does not fit above base port {}",
            id, base_port
        ))
    })
}
