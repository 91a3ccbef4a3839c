//! Common types for the GridTrack environment abstraction.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single colored 3-D sample from a stereo or depth sensor.
///
/// Coordinates are sensor-local meters (x right, y down, z forward).
/// Color is carried for downstream consumers; the tracking core ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColoredPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColoredPoint {
    /// Creates a point with a neutral gray color.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            r: 128,
            g: 128,
            b: 128,
        }
    }

    /// Creates a colored point.
    pub fn with_color(x: f32, y: f32, z: f32, rgb: [u8; 3]) -> Self {
        Self {
            x,
            y,
            z,
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
        }
    }

    /// Returns the spatial part as a double-precision vector.
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// True when every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Vector3<f64>> for ColoredPoint {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v.x as f32, v.y as f32, v.z as f32)
    }
}

/// A timestamped point sample set, as delivered by the acquisition layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudFrame {
    /// Acquisition time in seconds
    pub stamp: f64,

    /// Name of the sensor frame the points are expressed in
    pub frame_id: String,

    /// The samples themselves
    pub points: Vec<ColoredPoint>,
}

impl PointCloudFrame {
    /// Creates a frame from its parts.
    pub fn new(stamp: f64, frame_id: impl Into<String>, points: Vec<ColoredPoint>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
            points,
        }
    }

    /// Creates an empty frame (a sensor tick with no returns).
    pub fn empty(stamp: f64, frame_id: impl Into<String>) -> Self {
        Self::new(stamp, frame_id, Vec::new())
    }

    /// Number of samples in the frame.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the frame carries no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
