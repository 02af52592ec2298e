//! BINVOTE Core Library
//!
//! Core types, traits, and abstractions shared by every BINVOTE process.
//! This crate provides the foundation for all other BINVOTE components.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
