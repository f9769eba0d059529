//! # Spinlist Common Library
//!
//! Shared code for the spinlist crates:
//! - Error and result types
//! - TOML configuration loading and path resolution
//! - Tracing subscriber initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
