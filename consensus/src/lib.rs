//! BINVOTE Consensus Engine
//!
//! Implements synchronous round-based binary agreement with:
//! - Per-process vote inbox keyed by the local round counter
//! - Quorum of `N - 1 - F` peer votes per round
//! - `2F + 1` decision threshold, plain majority when `F = 0`

pub mod engine;
pub mod inbox;
pub mod vote;

pub use engine::*;
pub use inbox::*;
pub use vote::*;
