//! Error types for the simulation driver.

use gridtrack_core::ConfigError;

/// Errors surfaced by the `gridtrack-sim` binary and its runner.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Invalid tracker configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid usage: {0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
