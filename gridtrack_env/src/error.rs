//! Error types for the GridTrack environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to external collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// No transform is known between the two frames at all
    #[error("No transform from '{source_frame}' to '{target_frame}'")]
    UnknownFrame {
        source_frame: String,
        target_frame: String,
    },

    /// Transforms exist, but none close enough to the requested timestamp
    #[error("Transform for '{frame}' unavailable at t={stamp:.3}s (nearest {nearest_gap:.3}s away)")]
    TransformUnavailable {
        frame: String,
        stamp: f64,
        nearest_gap: f64,
    },

    /// Frame payload could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

impl EnvError {
    /// Creates an unknown-frame error.
    pub fn unknown_frame(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnknownFrame {
            source_frame: source.into(),
            target_frame: target.into(),
        }
    }

    /// True when the error only means "skip this frame".
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransformUnavailable { .. })
    }
}
