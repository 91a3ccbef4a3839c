//! GridTrack Sim - Synthetic scene driver
//!
//! Generates stereo-like point clouds of moving boxes, feeds them through
//! the GridTrack core and scores the tracked obstacles against ground truth.
//!
//! # Key Components
//!
//! - [`Scene`]: seeded ground truth and point-cloud generator, a [`gridtrack_env::FrameSource`]
//! - [`ScenarioRunner`]: runs a [`ScenarioId`] through a tracking session with an optional deadline
//! - [`SimExport`]: per-frame JSON export

pub mod error;
pub mod exporter;
pub mod runner;
pub mod scenarios;
pub mod scene;

pub use error::SimError;
pub use exporter::{BoxPosition, ObstacleRecord, SimExport, SimFrame};
pub use runner::{overran, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use scene::{BoxSpec, GroundTruthBox, Scene, SceneConfig, REFERENCE_FRAME, SENSOR_FRAME};
