//! Frame sources: anything that hands point-cloud frames to the core.

use std::collections::VecDeque;

use crate::types::PointCloudFrame;

/// Producer of point-cloud frames in acquisition order.
///
/// Implemented by drivers (synthetic scenes, recordings). Returns `None`
/// once the stream is exhausted.
pub trait FrameSource {
    /// Returns the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Option<PointCloudFrame>;

    /// Discards up to `n` pending frames, returning how many were dropped.
    ///
    /// Used by callers implementing an abandon-and-skip deadline policy.
    fn skip_frames(&mut self, n: usize) -> usize {
        let mut dropped = 0;
        while dropped < n && self.next_frame().is_some() {
            dropped += 1;
        }
        dropped
    }
}

/// A pre-recorded, in-memory sequence of frames.
#[derive(Debug, Default)]
pub struct VecFrameSource {
    frames: VecDeque<PointCloudFrame>,
}

impl VecFrameSource {
    /// Creates a source replaying `frames` in order.
    pub fn new(frames: Vec<PointCloudFrame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Frames still pending.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Option<PointCloudFrame> {
        self.frames.pop_front()
    }
}
