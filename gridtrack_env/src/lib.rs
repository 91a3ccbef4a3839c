//! GridTrack Environment Abstraction Layer
//!
//! This crate describes everything the tracking core *consumes* but does not
//! own: sensor samples, timestamped point-cloud frames, and the lookup of
//! coordinate-frame transforms between sensor and reference frames.
//!
//! # Core Concept: Collaborators, not Logic
//!
//! Acquisition, time synchronisation and transform resolution live outside
//! the core. The core only talks to them through:
//! - [`PointCloudFrame`] / [`ColoredPoint`]: the input sample set
//! - [`FrameSource`]: anything that yields frames (a driver, a recording)
//! - [`TransformProvider`]: sensor→reference transform lookup by timestamp
//!
//! A missing transform is an ordinary outcome ([`EnvError::TransformUnavailable`]),
//! which the core turns into a skipped frame.
//!
//! # Example
//!
//! ```ignore
//! use gridtrack_env::{TransformBuffer, TransformProvider};
//! use nalgebra::Isometry3;
//!
//! let mut tf = TransformBuffer::new("map", 0.05);
//! tf.insert("left_cam", 10.0, Isometry3::identity());
//! let pose = tf.lookup("left_cam", 10.01)?;
//! ```

mod error;
mod source;
mod transform;
mod types;

pub use error::EnvError;
pub use source::{FrameSource, VecFrameSource};
pub use transform::{StaticTransform, TransformBuffer, TransformProvider};
pub use types::{ColoredPoint, PointCloudFrame};
