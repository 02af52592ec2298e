//! BINVOTE Node Implementation
//!
//! Hosts one consensus process behind its HTTP control surface:
//! - Control and messaging API
//! - Standalone process node
//! - In-process cluster launcher

mod api;
mod cluster;
mod node;

pub use api::*;
pub use cluster::*;
pub use node::*;
