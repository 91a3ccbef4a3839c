//! Coordinate-frame transform lookup.
//!
//! The tracking core never resolves transforms itself. It asks a
//! [`TransformProvider`] for the sensor→reference pose at a frame's
//! timestamp and skips the frame when none is available.

use std::collections::HashMap;

use nalgebra::Isometry3;

use crate::error::EnvError;

/// Resolves the pose of a sensor frame in a fixed reference frame.
pub trait TransformProvider {
    /// Name of the reference (target) frame poses are expressed in.
    fn reference_frame(&self) -> &str;

    /// Returns the sensor→reference transform for `frame_id` at `stamp`.
    fn lookup(&self, frame_id: &str, stamp: f64) -> Result<Isometry3<f64>, EnvError>;
}

/// A transform that never changes (rigidly mounted sensor, static world).
#[derive(Debug, Clone)]
pub struct StaticTransform {
    reference: String,
    pose: Isometry3<f64>,
}

impl StaticTransform {
    /// Creates a static transform into `reference`.
    pub fn new(reference: impl Into<String>, pose: Isometry3<f64>) -> Self {
        Self {
            reference: reference.into(),
            pose,
        }
    }

    /// The identity transform (sensor frame == reference frame).
    pub fn identity(reference: impl Into<String>) -> Self {
        Self::new(reference, Isometry3::identity())
    }
}

impl TransformProvider for StaticTransform {
    fn reference_frame(&self) -> &str {
        &self.reference
    }

    fn lookup(&self, _frame_id: &str, _stamp: f64) -> Result<Isometry3<f64>, EnvError> {
        Ok(self.pose)
    }
}

/// Time-indexed transform history, one stream per sensor frame.
///
/// Lookups inside the recorded span interpolate between the bracketing
/// samples. Lookups outside it succeed only within `tolerance` seconds of the
/// nearest sample.
#[derive(Debug, Clone)]
pub struct TransformBuffer {
    reference: String,
    tolerance: f64,
    streams: HashMap<String, Vec<(f64, Isometry3<f64>)>>,
}

impl TransformBuffer {
    /// Creates an empty buffer into `reference`.
    pub fn new(reference: impl Into<String>, tolerance: f64) -> Self {
        Self {
            reference: reference.into(),
            tolerance: tolerance.max(0.0),
            streams: HashMap::new(),
        }
    }

    /// Records the pose of `frame_id` at `stamp`, keeping each stream sorted.
    pub fn insert(&mut self, frame_id: &str, stamp: f64, pose: Isometry3<f64>) {
        let stream = self.streams.entry(frame_id.to_string()).or_default();
        let pos = stream.partition_point(|(t, _)| *t < stamp);
        if pos < stream.len() && stream[pos].0 == stamp {
            stream[pos].1 = pose;
        } else {
            stream.insert(pos, (stamp, pose));
        }
    }

    /// Drops samples older than `stamp` (keeping one for bracketing).
    pub fn prune_before(&mut self, stamp: f64) {
        for stream in self.streams.values_mut() {
            let pos = stream.partition_point(|(t, _)| *t < stamp);
            if pos > 1 {
                stream.drain(..pos - 1);
            }
        }
    }

    /// Number of samples stored for `frame_id`.
    pub fn len(&self, frame_id: &str) -> usize {
        self.streams.get(frame_id).map_or(0, Vec::len)
    }
}

impl TransformProvider for TransformBuffer {
    fn reference_frame(&self) -> &str {
        &self.reference
    }

    fn lookup(&self, frame_id: &str, stamp: f64) -> Result<Isometry3<f64>, EnvError> {
        let stream = self
            .streams
            .get(frame_id)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EnvError::unknown_frame(frame_id, &self.reference))?;

        let pos = stream.partition_point(|(t, _)| *t < stamp);

        // Bracketed: interpolate
        if pos > 0 && pos < stream.len() {
            let (t0, p0) = &stream[pos - 1];
            let (t1, p1) = &stream[pos];
            let span = t1 - t0;
            let alpha = if span > 0.0 { (stamp - t0) / span } else { 0.0 };
            return Ok(p0.lerp_slerp(p1, alpha));
        }

        // Exact hit on the first sample, or extrapolation within tolerance
        let (nearest_stamp, nearest_pose) = if pos == 0 {
            &stream[0]
        } else {
            &stream[stream.len() - 1]
        };
        let gap = (stamp - nearest_stamp).abs();
        if gap <= self.tolerance {
            Ok(*nearest_pose)
        } else {
            Err(EnvError::TransformUnavailable {
                frame: frame_id.to_string(),
                stamp,
                nearest_gap: gap,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn translation(x: f64) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::new(x, 0.0, 0.0), UnitQuaternion::identity())
    }

    #[test]
    fn test_static_transform_always_resolves() {
        let tf = StaticTransform::new("map", translation(2.0));
        let pose = tf.lookup("anything", 123.0).unwrap();
        assert_relative_eq!(pose.translation.vector.x, 2.0);
        assert_eq!(tf.reference_frame(), "map");
    }

    #[test]
    fn test_buffer_interpolates_between_samples() {
        let mut tf = TransformBuffer::new("map", 0.01);
        tf.insert("cam", 1.0, translation(0.0));
        tf.insert("cam", 2.0, translation(10.0));

        let pose = tf.lookup("cam", 1.25).unwrap();
        assert_relative_eq!(pose.translation.vector.x, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_buffer_rejects_far_extrapolation() {
        let mut tf = TransformBuffer::new("map", 0.05);
        tf.insert("cam", 1.0, translation(0.0));

        assert!(tf.lookup("cam", 1.04).is_ok());
        let err = tf.lookup("cam", 1.5).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_buffer_unknown_frame() {
        let tf = TransformBuffer::new("map", 0.05);
        let err = tf.lookup("lidar", 0.0).unwrap_err();
        assert!(matches!(err, EnvError::UnknownFrame { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_insert_keeps_stream_sorted_and_prunes() {
        let mut tf = TransformBuffer::new("map", 0.0);
        tf.insert("cam", 3.0, translation(3.0));
        tf.insert("cam", 1.0, translation(1.0));
        tf.insert("cam", 2.0, translation(2.0));
        tf.insert("cam", 2.0, translation(2.5));
        assert_eq!(tf.len("cam"), 3);

        let pose = tf.lookup("cam", 2.0).unwrap();
        assert_relative_eq!(pose.translation.vector.x, 2.5, epsilon = 1e-9);

        tf.prune_before(2.5);
        assert_eq!(tf.len("cam"), 2);
    }
}
