//! BINVOTE operator tooling
//!
//! HTTP client for the per-process control surface.

pub mod commands;

pub use commands::*;
