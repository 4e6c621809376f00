//! thinstore Common - Shared types and utilities
//!
//! This crate provides the domain types, error definitions and
//! configuration model used by the tiered storage manager and the daemon.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
