//! The 3-D voxel tracking pipeline.
//!
//! Per frame, each stage fully completes before the next reads its output:
//! 1. Prediction (ego-motion + constant velocity, skipped on the first frame)
//! 2. Measurement-based update (occupancy, particle pruning, resampling, spawning)
//! 3. Segmentation (coherent connected components)
//! 4. Aggregation (union-find over nearby co-moving segments)
//! 5. Noise removal
//! 6. Obstacle update (association with the prior list)
//! 7. Filtering
//! 8. Common-volume joining
//! 9. Speed estimation (optionally fed back into particles)
//!
//! No stage fails on sensor noise: an empty frame yields an empty list.

mod aggregation;
mod association;
mod filtering;
mod forecast;
mod joining;
mod measurement;
mod noise;
mod obstacle;
mod prediction;
mod segmentation;
mod speed;

pub use aggregation::aggregate;
pub use association::{associate, overlap_score, Association};
pub use filtering::passes_filters;
pub use forecast::forecast_points;
pub use joining::{common_volume_ratio, join_common_volumes, JoinOutcome};
pub use measurement::{measurement_update, prune_particles, resample_particles, MeasurementParams, MeasurementStats};
pub use noise::{is_signal, remove_noise};
pub use obstacle::{JoinEvent, Obstacle, ObstacleState, VoxelCluster};
pub use prediction::predict;
pub use segmentation::segment;
pub use speed::{
    angle_diff, compute_main_vectors, feed_back_speeds, histogram_velocity, is_coherent,
    mean_velocity, obstacle_velocity, update_obstacle_speeds,
};

use std::time::Instant;

use gridtrack_env::ColoredPoint;
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::binary_map::build_voxel_measurement;
use crate::config::TrackerConfig;
use crate::error::ConfigError;
use crate::estimator::SpawnContext;
use crate::grid::{SpatialGrid, VoxelGrid};
use crate::particle::ParticleIdAllocator;

/// Monotonically increasing obstacle identifier.
pub type ObstacleId = u32;

// ============================================================================
// FRAME REPORT
// ============================================================================

/// Counters collected while processing one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub points: usize,
    pub occupied_voxels: usize,
    /// Particles alive after the frame
    pub particles: usize,
    pub moved: usize,
    pub escaped: usize,
    pub measurement: MeasurementStats,
    pub segments: usize,
    pub candidates: usize,
    pub noise_removed: usize,
    pub new_obstacles: usize,
    pub filtered: usize,
    pub stale: usize,
    pub removed: usize,
    pub joined: usize,
}

/// Output of [`VoxelGridTracker::process_frame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame: u64,
    pub stamp: f64,
    /// Time step used for prediction (0 on the first frame)
    pub dt: f64,
    /// Confirmed and tracked obstacles, sorted by id
    pub obstacles: Vec<Obstacle>,
    pub joins: Vec<JoinEvent>,
    /// Obstacles that ended this frame (`Removed` or `Absorbed`), sorted by id
    pub retired: Vec<Obstacle>,
    pub stats: FrameStats,
    pub elapsed_ms: f64,
}

// ============================================================================
// TRACKER
// ============================================================================

/// Owns the voxel grid, the particle population and the obstacle list.
#[derive(Debug)]
pub struct VoxelGridTracker {
    config: TrackerConfig,
    grid: VoxelGrid,
    particle_ids: ParticleIdAllocator,

    /// Live and stale obstacles, sorted by id
    obstacles: Vec<Obstacle>,
    next_obstacle_id: ObstacleId,

    frame: u64,
    last_stamp: Option<f64>,
    last_pose: Option<Isometry3<f64>>,
}

impl VoxelGridTracker {
    /// Validates `config` and builds an empty tracker.
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = VoxelGrid::new(&config.grid)?;
        Ok(Self {
            config,
            grid,
            particle_ids: ParticleIdAllocator::new(),
            obstacles: Vec::new(),
            next_obstacle_id: 0,
            frame: 0,
            last_stamp: None,
            last_pose: None,
        })
    }

    /// Tracker with the default configuration.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(TrackerConfig::default())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Obstacles currently reported (confirmed or tracked).
    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter().filter(|o| o.is_reported())
    }

    /// Every obstacle still held, including stale ones.
    pub fn all_obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Frames processed since construction or the last reset.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Clears grid state, obstacles, id counters and timing.
    pub fn reset(&mut self) {
        self.grid.clear();
        self.particle_ids.reset();
        self.obstacles.clear();
        self.next_obstacle_id = 0;
        self.frame = 0;
        self.last_stamp = None;
        self.last_pose = None;
    }

    /// Forecast point cloud of the reported obstacles.
    pub fn forecast(&self) -> Vec<ColoredPoint> {
        forecast_points(
            &self.obstacles,
            &self.grid,
            self.config.time_increment_for_forecast,
        )
    }

    /// Runs the full pipeline on one frame.
    ///
    /// `points` are in the sensor frame; `pose` is the sensor's pose in the
    /// reference frame at `stamp`, used for ego-motion compensation.
    pub fn process_frame(
        &mut self,
        points: &[ColoredPoint],
        stamp: f64,
        pose: &Isometry3<f64>,
    ) -> FrameReport {
        let started = Instant::now();
        let dt = self.time_step(stamp);
        let mut stats = FrameStats {
            points: points.len(),
            ..Default::default()
        };

        // Maps previous sensor-frame coordinates into the current frame
        let ego_motion = dt.and(self.last_pose).map(|prev| pose.inverse() * prev);

        // === Prediction ===
        if let Some(dt) = dt {
            let t = Instant::now();
            let relocation = predict(&mut self.grid, dt, ego_motion.as_ref());
            stats.moved = relocation.moved;
            stats.escaped = relocation.escaped;
            debug!(
                "prediction: dt={:.3}s moved={} escaped={} ({:?})",
                dt,
                relocation.moved,
                relocation.escaped,
                t.elapsed()
            );
        }

        // === Measurement-based update ===
        let t = Instant::now();
        let measurement = build_voxel_measurement(points, &self.grid);
        stats.occupied_voxels = measurement.occupied_count();
        let ctx = SpawnContext {
            config: &self.config.spawn,
            ids: &self.particle_ids,
            seed: self.config.seed,
            frame: self.frame,
        };
        let params = MeasurementParams {
            radii: self.config.neighbors,
            dynamics: &self.config.particles,
            camera: self.config.camera.as_ref(),
        };
        stats.measurement = measurement_update(&mut self.grid, &measurement, &params, &ctx);
        debug!(
            "measurement: occupied={} {:?} ({:?})",
            stats.occupied_voxels,
            stats.measurement,
            t.elapsed()
        );

        // === Segmentation + aggregation + noise removal ===
        let t = Instant::now();
        compute_main_vectors(&mut self.grid, &self.config.segmentation);
        let segments = segment(&self.grid, &self.config.segmentation);
        stats.segments = segments.len();
        let candidates = aggregate(segments, &self.grid, &self.config.segmentation);
        stats.candidates = candidates.len();
        let (candidates, noise_removed) = remove_noise(candidates, &self.grid, &self.config.obstacles);
        stats.noise_removed = noise_removed;
        debug!(
            "segmentation: segments={} candidates={} noise={} ({:?})",
            stats.segments,
            stats.candidates,
            noise_removed,
            t.elapsed()
        );

        // === Obstacle update, filtering, joining, speed ===
        let t = Instant::now();
        let update = self.update_obstacles(candidates, dt.unwrap_or(0.0), ego_motion.as_ref(), &mut stats);
        debug!(
            "obstacles: live={} new={} stale={} removed={} joined={} ({:?})",
            self.obstacles().count(),
            stats.new_obstacles,
            stats.stale,
            stats.removed,
            stats.joined,
            t.elapsed()
        );

        stats.particles = self.grid.particle_count();
        self.last_stamp = Some(stamp);
        self.last_pose = Some(*pose);

        let report = FrameReport {
            frame: self.frame,
            stamp,
            dt: dt.unwrap_or(0.0),
            obstacles: self.obstacles().cloned().collect(),
            joins: update.joins,
            retired: update.retired,
            stats,
            elapsed_ms: started.elapsed().as_secs_f64() * 1e3,
        };
        self.frame += 1;
        report
    }

    /// Time since the previous frame, clamped to `max_time_step`.
    ///
    /// `None` on the first frame. Non-increasing stamps give a zero step.
    fn time_step(&self, stamp: f64) -> Option<f64> {
        let last = self.last_stamp?;
        let dt = stamp - last;
        if !(dt.is_finite() && dt > 0.0) {
            warn!("Non-increasing frame stamp {} (previous {}), no motion applied", stamp, last);
            return Some(0.0);
        }
        if dt > self.config.max_time_step {
            warn!("Frame gap {:.3}s clamped to {:.3}s", dt, self.config.max_time_step);
            return Some(self.config.max_time_step);
        }
        Some(dt)
    }

    /// Association, lifecycle transitions, filtering, joining and speed.
    ///
    /// Priors are first moved into the current sensor frame by `ego_motion`.
    /// New obstacles carry provisional ids until joining is done, so an
    /// absorbed newcomer never consumes an id.
    fn update_obstacles(
        &mut self,
        candidates: Vec<VoxelCluster>,
        dt: f64,
        ego_motion: Option<&Isometry3<f64>>,
        stats: &mut FrameStats,
    ) -> ObstacleUpdate {
        let config = self.config.obstacles;
        let grid = &self.grid;

        let mut priors = std::mem::take(&mut self.obstacles);
        if let Some(motion) = ego_motion {
            for prior in &mut priors {
                prior.apply_ego_motion(motion, grid);
            }
        }
        let association = associate(&priors, &candidates, grid, dt, &config);

        let mut priors: Vec<Option<Obstacle>> = priors.into_iter().map(Some).collect();
        let mut candidates: Vec<Option<VoxelCluster>> = candidates.into_iter().map(Some).collect();
        let mut live: Vec<Obstacle> = Vec::new();
        let mut missed: Vec<Obstacle> = Vec::new();
        let mut retired: Vec<Obstacle> = Vec::new();

        for &(pi, ci) in &association.matches {
            let (Some(prior), Some(cluster)) = (priors[pi].take(), candidates[ci].take()) else {
                continue;
            };
            let mut updated = prior.clone();
            updated.set_cluster(cluster, grid);
            if passes_filters(&updated, &config) {
                updated.state = ObstacleState::Tracked;
                updated.hits += 1;
                updated.missed_frames = 0;
                live.push(updated);
            } else {
                stats.filtered += 1;
                missed.push(prior);
            }
        }
        missed.extend(association.unmatched_priors.iter().filter_map(|&pi| priors[pi].take()));

        // Provisional ids sit above every prior id
        let first_new = self.next_obstacle_id;
        let mut provisional = first_new;
        for &ci in &association.unmatched_candidates {
            let Some(cluster) = candidates[ci].take() else {
                continue;
            };
            let obstacle = Obstacle::new(provisional, cluster, grid);
            if passes_filters(&obstacle, &config) {
                provisional += 1;
                live.push(obstacle);
            } else {
                stats.filtered += 1;
            }
        }

        let mut stale = Vec::new();
        for mut obstacle in missed {
            obstacle.missed_frames += 1;
            if obstacle.missed_frames >= config.max_missed_frames {
                obstacle.state = ObstacleState::Removed;
                stats.removed += 1;
                debug!("obstacle {} removed after {} missed frames", obstacle.id, obstacle.missed_frames);
                retired.push(obstacle);
                continue;
            }
            obstacle.state = ObstacleState::Stale;
            obstacle.coast(dt, grid);
            stale.push(obstacle);
        }
        stats.stale = stale.len();

        let outcome = join_common_volumes(&mut live, grid, config.max_common_volume);
        let mut joins = Vec::new();
        for (event, absorbed) in outcome.events.into_iter().zip(outcome.absorbed) {
            // A newcomer folded into another obstacle was never reported
            if absorbed.id < first_new {
                debug!("obstacle {} absorbed by {}", event.absorbed, event.survivor);
                joins.push(event);
                retired.push(absorbed);
            }
        }
        stats.joined = joins.len();

        // `live` is sorted by id, so survivors keep their relative order
        for obstacle in live.iter_mut().filter(|o| o.id >= first_new) {
            obstacle.id = self.next_obstacle_id;
            self.next_obstacle_id += 1;
            stats.new_obstacles += 1;
        }

        update_obstacle_speeds(&mut live, grid, config.speed_source);
        if config.feedback_obstacle_speed {
            feed_back_speeds(&live, &mut self.grid);
        }

        for voxel in self.grid.voxels_mut() {
            voxel.set_obstacle(None);
        }
        for obstacle in &live {
            for &i in &obstacle.voxels {
                self.grid.voxels_mut()[i].set_obstacle(Some(obstacle.id));
            }
        }

        live.extend(stale);
        live.sort_by_key(|o| o.id);
        self.obstacles = live;
        retired.sort_by_key(|o| o.id);
        ObstacleUpdate { joins, retired }
    }
}

/// Lifecycle output of one obstacle update.
struct ObstacleUpdate {
    joins: Vec<JoinEvent>,
    retired: Vec<Obstacle>,
}
