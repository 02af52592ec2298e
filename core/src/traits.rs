//! Core traits defining BINVOTE interfaces
//!
//! The consensus engine only talks to the outside world through these
//! contracts; the networking crate provides the implementations.

use crate::types::*;
use async_trait::async_trait;

/// Result type for BINVOTE operations
pub type BinvoteResult<T> = Result<T, crate::error::BinvoteError>;

/// Delivers votes from one process to the others.
///
/// Delivery is best effort: implementations log and swallow individual
/// failures, and never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `value` from `from` to every other process of the cluster
    async fn broadcast(&self, from: ProcessId, value: Value);
}

/// Barrier reporting whether every process is accepting requests
#[async_trait]
pub trait ReadinessGate: Send + Sync {
    async fn is_cluster_ready(&self) -> bool;
}
