//! Error types for BINVOTE

use thiserror::Error;

/// Main error type for BINVOTE
#[derive(Error, Debug)]
pub enum BinvoteError {
    // ============ Process Errors ============
    #[error("Process is stopped")]
    ProcessStopped,

    #[error("Process is faulty")]
    ProcessFaulty,

    #[error("Invalid process id {id} for a cluster of {node_count}")]
    InvalidProcessId { id: usize, node_count: usize },

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ============ Network Errors ============
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Bind failed on {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    // ============ Serialization Errors ============
    #[error("Serialization failed: {0}")]
    SerializationError(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BinvoteError {
    /// Errors caused by the caller asking a process to do something it
    /// currently refuses to do
    pub fn is_rejection(&self) -> bool {
        matches!(self, BinvoteError::ProcessStopped | BinvoteError::ProcessFaulty)
    }
}

impl From<std::io::Error> for BinvoteError {
    fn from(err: std::io::Error) -> Self {
        BinvoteError::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for BinvoteError {
    fn from(err: serde_json::Error) -> Self {
        BinvoteError::SerializationError(err.to_string())
    }
}
