//! Synthetic scene - ground truth boxes and the point clouds they produce.
//!
//! Stands in for the stereo front end. Each frame samples noisy points inside
//! every box (a dense reconstruction of a solid), expresses them in the
//! sensor frame and records the sensor pose so that a transform buffer can
//! be filled alongside. The scene owns a seeded `ChaCha8Rng`, so a given
//! seed always yields the same frames.

use gridtrack_env::{ColoredPoint, FrameSource, PointCloudFrame, TransformBuffer};
use nalgebra::{Isometry3, Point3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Name of the sensor frame every synthetic cloud is expressed in.
pub const SENSOR_FRAME: &str = "stereo";

/// Name of the fixed reference frame poses are expressed in.
pub const REFERENCE_FRAME: &str = "map";

// ============================================================================
// CONFIGURATION
// ============================================================================

/// An axis-aligned box moving at constant velocity in the map frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSpec {
    /// Centre at t = 0 (m)
    pub center: Vector3<f64>,
    pub half_extent: Vector3<f64>,
    /// Constant velocity (m/s)
    pub velocity: Vector3<f64>,
}

impl BoxSpec {
    /// A cube with half side `half`.
    pub fn cube(center: Vector3<f64>, half: f64, velocity: Vector3<f64>) -> Self {
        Self {
            center,
            half_extent: Vector3::repeat(half),
            velocity,
        }
    }

    /// Centre at time `t`.
    pub fn center_at(&self, t: f64) -> Vector3<f64> {
        self.center + self.velocity * t
    }
}

/// Everything needed to replay a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    pub seed: u64,
    pub frames: usize,
    /// Seconds between frames
    pub frame_period: f64,
    pub points_per_box: usize,
    /// Standard deviation of the per-axis point noise (m)
    pub point_noise: f64,
    pub boxes: Vec<BoxSpec>,
    /// Constant sensor velocity in the map frame (m/s)
    pub ego_velocity: Vector3<f64>,
    /// Pose samples in `[start, end)` seconds are never published
    pub pose_dropout: Option<(f64, f64)>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            frames: 40,
            frame_period: 0.1,
            points_per_box: 600,
            point_noise: 0.01,
            boxes: Vec::new(),
            ego_velocity: Vector3::zeros(),
            pose_dropout: None,
        }
    }
}

// ============================================================================
// GROUND TRUTH
// ============================================================================

/// Where a box really is, expressed in the sensor frame of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruthBox {
    pub id: u64,
    pub center: Vector3<f64>,
    /// World velocity rotated into the sensor frame
    pub velocity: Vector3<f64>,
}

// ============================================================================
// SCENE
// ============================================================================

/// Deterministic synthetic point-cloud generator.
pub struct Scene {
    config: SceneConfig,
    rng: ChaCha8Rng,
    noise: Option<Normal<f64>>,
    frame: usize,
    pose_sample: Option<(f64, Isometry3<f64>)>,
    truth: Vec<GroundTruthBox>,
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        let noise = if config.point_noise > 0.0 {
            Normal::new(0.0, config.point_noise).ok()
        } else {
            None
        };
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            noise,
            frame: 0,
            pose_sample: None,
            truth: Vec::new(),
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Frames generated so far (including skipped ones).
    pub fn frames_generated(&self) -> usize {
        self.frame
    }

    /// Timestamp of frame `n`.
    pub fn stamp_of(&self, n: usize) -> f64 {
        n as f64 * self.config.frame_period
    }

    /// Sensor→map pose at time `t`.
    pub fn sensor_pose(&self, t: f64) -> Isometry3<f64> {
        Isometry3::translation(
            self.config.ego_velocity.x * t,
            self.config.ego_velocity.y * t,
            self.config.ego_velocity.z * t,
        )
    }

    /// Whether the pose at `t` falls inside the configured dropout window.
    pub fn pose_dropped(&self, t: f64) -> bool {
        self.config
            .pose_dropout
            .map_or(false, |(start, end)| t >= start && t < end)
    }

    /// Pose published with the most recent frame, if any.
    pub fn pose_sample(&self) -> Option<(f64, Isometry3<f64>)> {
        self.pose_sample
    }

    /// Ground truth of the most recent frame.
    pub fn ground_truth(&self) -> &[GroundTruthBox] {
        &self.truth
    }

    /// Records the most recent pose sample into `buffer`.
    ///
    /// Returns false when the pose was dropped for this frame.
    pub fn publish_pose(&self, buffer: &mut TransformBuffer) -> bool {
        match self.pose_sample {
            Some((stamp, pose)) => {
                buffer.insert(SENSOR_FRAME, stamp, pose);
                true
            }
            None => false,
        }
    }

    fn sample_box(&mut self, spec: &BoxSpec, t: f64, to_sensor: &Isometry3<f64>, out: &mut Vec<ColoredPoint>) {
        let center = spec.center_at(t);
        let h = spec.half_extent;
        for _ in 0..self.config.points_per_box {
            let mut p = Vector3::new(
                center.x + sample_axis(&mut self.rng, h.x),
                center.y + sample_axis(&mut self.rng, h.y),
                center.z + sample_axis(&mut self.rng, h.z),
            );
            if let Some(noise) = &self.noise {
                p += Vector3::new(
                    noise.sample(&mut self.rng),
                    noise.sample(&mut self.rng),
                    noise.sample(&mut self.rng),
                );
            }
            let local = to_sensor * Point3::from(p);
            out.push(ColoredPoint::from(local.coords));
        }
    }
}

impl FrameSource for Scene {
    fn next_frame(&mut self) -> Option<PointCloudFrame> {
        if self.frame >= self.config.frames {
            return None;
        }
        let t = self.stamp_of(self.frame);
        let pose = self.sensor_pose(t);
        let to_sensor = pose.inverse();

        let boxes = self.config.boxes.clone();
        let mut points = Vec::with_capacity(boxes.len() * self.config.points_per_box);
        for spec in &boxes {
            self.sample_box(spec, t, &to_sensor, &mut points);
        }

        self.truth = boxes
            .iter()
            .enumerate()
            .map(|(id, spec)| GroundTruthBox {
                id: id as u64,
                center: (to_sensor * Point3::from(spec.center_at(t))).coords,
                velocity: to_sensor.rotation * spec.velocity,
            })
            .collect();
        self.pose_sample = if self.pose_dropped(t) { None } else { Some((t, pose)) };
        self.frame += 1;

        Some(PointCloudFrame::new(t, SENSOR_FRAME, points))
    }
}

/// Uniform in `[-half, half)`, or 0 for a flat axis.
fn sample_axis(rng: &mut ChaCha8Rng, half: f64) -> f64 {
    if half > 0.0 {
        rng.gen_range(-half..half)
    } else {
        0.0
    }
}
