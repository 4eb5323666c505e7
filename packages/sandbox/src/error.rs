// ABOUTME: Error types for supervised execution inside containers
// ABOUTME: Separates request, configuration, lookup and engine failures from code failures

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sandbox operations.
///
/// A nonzero exit code or a timeout is never reported through this type;
/// both are normal outcomes carried inside an `ExecutionResult`.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Malformed request (both/neither payload, bad overrides)
    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Target container missing or not running
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// Local file handed to `execute_file` does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Docker/engine transport errors
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Engine failures not tied to a Docker API response
    #[error("Engine error: {0}")]
    Engine(String),

    /// Operation attempted after `close()`
    #[error("Sandbox is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
