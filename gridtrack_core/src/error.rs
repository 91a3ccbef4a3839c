//! Error types for the GridTrack core.

use crate::particle::ParticleId;

/// Fatal, construction-time configuration problems.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimension '{axis}' must be positive")]
    InvalidDimension { axis: &'static str },

    #[error("Cell size '{axis}' must be positive and finite, got {value}")]
    InvalidCellSize { axis: &'static str, value: f64 },

    #[error("Invalid camera parameters: {0}")]
    InvalidCamera(String),

    #[error("Parameter '{name}' out of range: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

impl ConfigError {
    /// Shorthand for an out-of-range parameter.
    pub fn parameter(name: &'static str, value: f64) -> Self {
        Self::InvalidParameter { name, value }
    }
}

/// Errors from explicit index-based grid operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("Grid index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Particle {0} not found in source cell")]
    ParticleNotFound(ParticleId),
}
