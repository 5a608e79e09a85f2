//! Unified error handling for Chassismon
//!
//! This crate provides a single error type used across all Chassismon components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using ChassisError
pub type Result<T> = std::result::Result<T, ChassisError>;

/// Unified error type for all Chassismon operations
#[derive(thiserror::Error, Debug)]
pub enum ChassisError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Platform Feed Errors
    // ============================================================================
    #[error("Platform transport failure: {0}")]
    Transport(String),

    #[error("Platform service rejected {request}: {message}")]
    PlatformRejected {
        request: String,
        message: String,
    },

    #[error("Event subscription closed by platform service")]
    SubscriptionClosed,

    // ============================================================================
    // Fact Decoding Errors
    // ============================================================================
    #[error("{fact} record is missing required attribute '{attribute}'")]
    MissingAttribute {
        fact: &'static str,
        attribute: &'static str,
    },

    #[error("{fact} record has invalid {attribute}: {value}")]
    InvalidAttribute {
        fact: &'static str,
        attribute: &'static str,
        value: String,
    },

    // ============================================================================
    // Condition and Indicator Errors
    // ============================================================================
    #[error("Invalid condition pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("Failed to write indicator {name}: {reason}")]
    IndicatorWrite {
        name: String,
        reason: String,
    },

    #[error("Invalid indicator name: {0}")]
    InvalidIndicatorName(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    #[error("Daemon connection failed: {0}")]
    DaemonConnection(String),

    #[error("Daemon request failed: {0}")]
    DaemonRequest(String),

    #[error("Daemon response error: {0}")]
    DaemonResponse(String),

    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },
}

impl ChassisError {
    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a platform transport error from a string
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Whether the reconciliation loop recovers from this error by
    /// discarding state and rebuilding after the backoff interval.
    ///
    /// Configuration errors are only raised at startup and are fatal there.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig { .. } | Self::InvalidIndicatorName(_)
        )
    }
}
