//! BINVOTE Networking
//!
//! Connects processes over plain HTTP:
//! - Peer directory mapping process ids to endpoints
//! - Best-effort vote broadcast
//! - Readiness barriers over HTTP or in-process flags

pub mod network;
pub mod message;
pub mod peer;
pub mod readiness;

pub use network::*;
pub use message::*;
pub use peer::*;
pub use readiness::*;

#[cfg(test)]
mod testing;
