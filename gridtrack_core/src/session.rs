//! Frame session: joins transform lookup with the voxel tracker.
//!
//! A frame whose sensor pose cannot be resolved is skipped. The tracker is
//! not touched, so prior grid and obstacle state carry over unchanged.

use gridtrack_env::{EnvError, FrameSource, PointCloudFrame, TransformProvider};
use tracing::warn;

use crate::tracking::{FrameReport, VoxelGridTracker};

/// What happened to one incoming frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Processed(FrameReport),
    Skipped(EnvError),
}

impl FrameOutcome {
    pub fn report(&self) -> Option<&FrameReport> {
        match self {
            FrameOutcome::Processed(report) => Some(report),
            FrameOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FrameOutcome::Skipped(_))
    }
}

/// Drives a [`VoxelGridTracker`] from timestamped frames.
#[derive(Debug)]
pub struct TrackingSession<T: TransformProvider> {
    tracker: VoxelGridTracker,
    transforms: T,
    processed: u64,
    skipped: u64,
}

impl<T: TransformProvider> TrackingSession<T> {
    pub fn new(tracker: VoxelGridTracker, transforms: T) -> Self {
        Self {
            tracker,
            transforms,
            processed: 0,
            skipped: 0,
        }
    }

    pub fn tracker(&self) -> &VoxelGridTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut VoxelGridTracker {
        &mut self.tracker
    }

    pub fn transforms(&self) -> &T {
        &self.transforms
    }

    /// Mutable access, e.g. to feed new poses into a buffer.
    pub fn transforms_mut(&mut self) -> &mut T {
        &mut self.transforms
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Processes one frame, or skips it when its pose is unavailable.
    pub fn process(&mut self, frame: &PointCloudFrame) -> FrameOutcome {
        if !frame.stamp.is_finite() {
            return self.skip(EnvError::MalformedFrame(format!(
                "non-finite stamp on '{}'",
                frame.frame_id
            )));
        }

        match self.transforms.lookup(&frame.frame_id, frame.stamp) {
            Ok(pose) => {
                self.processed += 1;
                FrameOutcome::Processed(self.tracker.process_frame(&frame.points, frame.stamp, &pose))
            }
            Err(e) => self.skip(e),
        }
    }

    /// Pulls frames from `source` until it is exhausted.
    pub fn run<S: FrameSource>(&mut self, source: &mut S) -> Vec<FrameOutcome> {
        let mut outcomes = Vec::new();
        while let Some(frame) = source.next_frame() {
            outcomes.push(self.process(&frame));
        }
        outcomes
    }

    fn skip(&mut self, reason: EnvError) -> FrameOutcome {
        self.skipped += 1;
        warn!("Skipping frame: {}", reason);
        FrameOutcome::Skipped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use gridtrack_env::{ColoredPoint, StaticTransform, TransformBuffer, VecFrameSource};
    use nalgebra::Isometry3;

    fn tracker() -> VoxelGridTracker {
        VoxelGridTracker::new(TrackerConfig::default()).unwrap()
    }

    #[test]
    fn test_static_transform_processes_every_frame() {
        let mut session = TrackingSession::new(tracker(), StaticTransform::identity("map"));
        let mut source = VecFrameSource::new(vec![
            PointCloudFrame::empty(0.0, "camera"),
            PointCloudFrame::new(0.1, "camera", vec![ColoredPoint::new(0.0, 0.0, 2.0)]),
        ]);

        let outcomes = session.run(&mut source);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.is_skipped()));
        assert_eq!(session.processed(), 2);
        assert_eq!(session.tracker().frame_count(), 2);
    }

    #[test]
    fn test_missing_transform_skips_without_touching_state() {
        let mut buffer = TransformBuffer::new("map", 0.05);
        buffer.insert("camera", 0.0, Isometry3::identity());
        let mut session = TrackingSession::new(tracker(), buffer);

        let first = session.process(&PointCloudFrame::empty(0.0, "camera"));
        let second = session.process(&PointCloudFrame::empty(5.0, "camera"));
        let third = session.process(&PointCloudFrame::empty(0.0, "lidar"));

        assert!(!first.is_skipped());
        assert!(matches!(second, FrameOutcome::Skipped(EnvError::TransformUnavailable { .. })));
        assert!(matches!(third, FrameOutcome::Skipped(EnvError::UnknownFrame { .. })));
        assert_eq!(session.skipped(), 2);
        assert_eq!(session.tracker().frame_count(), 1);
    }

    #[test]
    fn test_non_finite_stamp_is_skipped() {
        let mut session = TrackingSession::new(tracker(), StaticTransform::identity("map"));
        let outcome = session.process(&PointCloudFrame::empty(f64::NAN, "camera"));
        assert!(matches!(outcome, FrameOutcome::Skipped(EnvError::MalformedFrame(_))));
        assert!(outcome.report().is_none());
    }
}
