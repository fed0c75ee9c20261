//! Error types for emberlog.
//!
//! This module provides a unified error type [`EmberlogError`] for all
//! emberlog operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Usage errors**: invalid attribute keys, ending a never-started span,
//!   out-of-range sample rates. These fail fast at the call boundary.
//! - **Configuration**: invalid settings or an unreadable config file.
//! - **Export**: a sink could not deliver a batch. Export errors are routed
//!   through the fallback sink before they surface, so they signal delivery
//!   failure, not data loss.
//!
//! Encoding anomalies (oversized integers, unserializable values) are NOT
//! errors: they degrade with a diagnostic and emission still succeeds.

use std::io;
use thiserror::Error;

/// Main error type for emberlog operations.
#[derive(Error, Debug)]
pub enum EmberlogError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EmberlogError {
    /// Whether this error indicates direct misuse of the public API.
    ///
    /// Usage errors are programmer errors and should not be retried.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            EmberlogError::InvalidArgument(_) | EmberlogError::InvalidState(_)
        )
    }
}

/// Result type alias for emberlog operations.
pub type Result<T> = std::result::Result<T, EmberlogError>;
