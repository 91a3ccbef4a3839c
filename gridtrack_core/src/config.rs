//! Configuration for both grid variants and the tracking pipeline.
//!
//! Everything is supplied once at startup and is immutable afterwards;
//! trackers keep their own validated copy. All structs deserialize from JSON
//! with per-field defaults, so a config file only needs the values it changes.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::camera::CameraParams;
use crate::error::ConfigError;

// ============================================================================
// SHARED
// ============================================================================

/// Particle spawning policy shared by both grid variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Particles created in a newly occupied, empty cell
    pub particles_per_cell: usize,

    /// Occupancy probability a cell must exceed before spawning
    pub thresh_prob_for_creation: f64,

    /// Per-axis bound for uniformly sampled initial velocity (m/s)
    pub max_velocity: [f64; 3],
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            particles_per_cell: 10,
            thresh_prob_for_creation: 0.05,
            max_velocity: [0.0; 3],
        }
    }
}

/// Upper bound on a particle's initial speed per axis (m/s).
pub const MAX_PARTICLE_SPEED: f64 = 1.0e4;

impl SpawnConfig {
    pub fn max_velocity(&self) -> Vector3<f64> {
        Vector3::from(self.max_velocity)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.thresh_prob_for_creation) {
            return Err(ConfigError::parameter(
                "thresh_prob_for_creation",
                self.thresh_prob_for_creation,
            ));
        }
        for v in self.max_velocity {
            if !(0.0..=MAX_PARTICLE_SPEED).contains(&v) {
                return Err(ConfigError::parameter("max_velocity", v));
            }
        }
        Ok(())
    }
}

fn check_dimension(axis: &'static str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::InvalidDimension { axis })
    } else {
        Ok(())
    }
}

fn check_cell_size(axis: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidCellSize { axis, value })
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::parameter(name, value))
    }
}

// ============================================================================
// POLAR (2-D) GRID
// ============================================================================

/// How each polar cell's smoothing radii are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingRadii {
    /// Derived from stereo uncertainty at the cell's depth
    FromCamera,
    /// The same radii everywhere
    Fixed { x: u32, z: u32 },
}

/// Configuration for the 2-D polar occupancy grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarGridConfig {
    /// Depth bins
    pub rows: u32,
    /// Lateral bins, symmetric about x = 0
    pub cols: u32,
    pub cell_size_x: f64,
    pub cell_size_z: f64,
    pub camera: CameraParams,
    pub radii: SmoothingRadii,
    pub spawn: SpawnConfig,
    /// Ceiling applied by the explicit cap maintenance step
    pub max_particles_per_cell: usize,
    /// Seed for particle sampling
    pub seed: u64,
}

impl Default for PolarGridConfig {
    fn default() -> Self {
        Self {
            rows: 100,
            cols: 100,
            cell_size_x: 0.2,
            cell_size_z: 0.2,
            camera: CameraParams::default(),
            radii: SmoothingRadii::FromCamera,
            spawn: SpawnConfig::default(),
            max_particles_per_cell: 50,
            seed: 42,
        }
    }
}

impl PolarGridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_dimension("rows", self.rows)?;
        check_dimension("cols", self.cols)?;
        check_cell_size("cell_size_x", self.cell_size_x)?;
        check_cell_size("cell_size_z", self.cell_size_z)?;
        self.camera.validate()?;
        self.spawn.validate()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// VOXEL (3-D) GRID
// ============================================================================

/// Geometry of the 3-D voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelGridConfig {
    /// Voxels per axis [x, y, z]
    pub dims: [u32; 3],
    /// Lower corner of the grid in the sensor frame (meters)
    pub min: [f64; 3],
    /// Voxel edge lengths [x, y, z] (meters)
    pub cell_size: [f64; 3],
}

impl Default for VoxelGridConfig {
    fn default() -> Self {
        Self {
            dims: [40, 10, 40],
            min: [-5.0, -2.0, 0.0],
            cell_size: [0.25, 0.25, 0.25],
        }
    }
}

impl VoxelGridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_dimension("dim_x", self.dims[0])?;
        check_dimension("dim_y", self.dims[1])?;
        check_dimension("dim_z", self.dims[2])?;
        check_cell_size("cell_size_x", self.cell_size[0])?;
        check_cell_size("cell_size_y", self.cell_size[1])?;
        check_cell_size("cell_size_z", self.cell_size[2])?;
        for v in self.min {
            if !v.is_finite() {
                return Err(ConfigError::parameter("min", v));
            }
        }
        Ok(())
    }
}

/// Neighbourhood adjacency used when growing segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Face neighbours
    Six,
    /// Face + edge neighbours
    Eighteen,
    /// Face + edge + corner neighbours
    #[default]
    TwentySix,
}

/// How a voxel's dominant particle velocity ("main vector") is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMethod {
    /// Mean of all particle velocities
    #[default]
    Mean,
    /// Mean of the most populated yaw/pitch histogram bin
    Histogram,
}

/// Where an obstacle's velocity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleSpeedSource {
    /// Occupancy-weighted mean of member voxel main vectors
    #[default]
    PerVoxel,
    /// Mean of every member particle's velocity
    PerObstacle,
}

/// Particle life-cycle parameters for the 3-D model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleDynamicsConfig {
    /// Particles older than this (frames) are removed
    pub max_particle_age: u32,
    /// Std-dev of velocity diffusion when refilling a voxel (m/s)
    pub velocity_noise: f64,
    /// Hard per-voxel ceiling
    pub max_particles_per_voxel: usize,
}

impl Default for ParticleDynamicsConfig {
    fn default() -> Self {
        Self {
            max_particle_age: 30,
            velocity_noise: 0.1,
            max_particles_per_voxel: 40,
        }
    }
}

/// Velocity-coherence and main-vector parameters for segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub connectivity: Connectivity,
    /// Max yaw difference between neighbouring voxels (radians)
    pub thresh_yaw: f64,
    /// Max pitch difference (radians)
    pub thresh_pitch: f64,
    /// Max speed difference (m/s)
    pub thresh_magnitude: f64,
    pub speed_method: SpeedMethod,
    /// Histogram bin width for yaw (radians)
    pub yaw_interval: f64,
    /// Histogram bin width for pitch (radians)
    pub pitch_interval: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::TwentySix,
            thresh_yaw: std::f64::consts::FRAC_PI_4,
            thresh_pitch: std::f64::consts::FRAC_PI_4,
            thresh_magnitude: 1.0,
            speed_method: SpeedMethod::Mean,
            yaw_interval: std::f64::consts::PI / 8.0,
            pitch_interval: std::f64::consts::PI / 8.0,
        }
    }
}

/// Obstacle extraction, association and filtering thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub min_voxels_per_obstacle: usize,
    /// Minimum mean occupancy probability of a candidate's voxels
    pub min_voxel_density: f64,
    /// Minimum members / bounding-box volume (in voxels)
    pub min_obstacle_density: f64,
    /// Physical height range along y (meters)
    pub min_obstacle_height: f64,
    pub max_obstacle_height: f64,
    /// Overlap fraction above which two obstacles are joined
    pub max_common_volume: f64,
    /// Membership overlap needed to keep an identity
    pub min_overlap_ratio: f64,
    /// Centroid fallback gate (meters)
    pub max_association_distance: f64,
    /// Consecutive misses before a stale obstacle is removed
    pub max_missed_frames: u32,
    pub speed_source: ObstacleSpeedSource,
    /// Write obstacle velocity back into member particles
    pub feedback_obstacle_speed: bool,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            min_voxels_per_obstacle: 5,
            min_voxel_density: 0.0,
            min_obstacle_density: 0.0,
            min_obstacle_height: 0.0,
            max_obstacle_height: f64::MAX,
            max_common_volume: 0.5,
            min_overlap_ratio: 0.3,
            max_association_distance: 1.0,
            max_missed_frames: 3,
            speed_source: ObstacleSpeedSource::PerVoxel,
            feedback_obstacle_speed: false,
        }
    }
}

impl ObstacleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("min_voxel_density", self.min_voxel_density)?;
        check_non_negative("min_obstacle_density", self.min_obstacle_density)?;
        check_non_negative("min_obstacle_height", self.min_obstacle_height)?;
        if !(self.max_obstacle_height >= self.min_obstacle_height) {
            return Err(ConfigError::parameter(
                "max_obstacle_height",
                self.max_obstacle_height,
            ));
        }
        check_non_negative("max_common_volume", self.max_common_volume)?;
        check_non_negative("min_overlap_ratio", self.min_overlap_ratio)?;
        check_non_negative("max_association_distance", self.max_association_distance)
    }
}

// ============================================================================
// TRACKER
// ============================================================================

/// Complete configuration of the 3-D voxel tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub grid: VoxelGridConfig,

    /// When present, voxels outside the field of view keep their particles
    pub camera: Option<CameraParams>,

    pub spawn: SpawnConfig,

    /// Occupancy smoothing radii [x, y, z] in voxels
    pub neighbors: [u32; 3],

    pub particles: ParticleDynamicsConfig,
    pub segmentation: SegmentationConfig,
    pub obstacles: ObstacleConfig,

    /// Look-ahead for the forecast point cloud (seconds)
    pub time_increment_for_forecast: f64,

    /// Larger frame gaps are clamped to this step (seconds)
    pub max_time_step: f64,

    pub seed: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            grid: VoxelGridConfig::default(),
            camera: None,
            spawn: SpawnConfig {
                particles_per_cell: 10,
                thresh_prob_for_creation: 0.05,
                max_velocity: [2.0, 0.5, 2.0],
            },
            neighbors: [1, 1, 1],
            particles: ParticleDynamicsConfig::default(),
            segmentation: SegmentationConfig::default(),
            obstacles: ObstacleConfig::default(),
            time_increment_for_forecast: 0.5,
            max_time_step: 1.0,
            seed: 42,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        if let Some(camera) = &self.camera {
            camera.validate()?;
        }
        self.spawn.validate()?;
        self.obstacles.validate()?;
        check_non_negative("velocity_noise", self.particles.velocity_noise)?;
        let seg = &self.segmentation;
        check_non_negative("thresh_yaw", seg.thresh_yaw)?;
        check_non_negative("thresh_pitch", seg.thresh_pitch)?;
        check_non_negative("thresh_magnitude", seg.thresh_magnitude)?;
        if !(seg.yaw_interval > 0.0) {
            return Err(ConfigError::parameter("yaw_interval", seg.yaw_interval));
        }
        if !(seg.pitch_interval > 0.0) {
            return Err(ConfigError::parameter("pitch_interval", seg.pitch_interval));
        }
        check_non_negative("time_increment_for_forecast", self.time_increment_for_forecast)?;
        if !(self.max_time_step > 0.0) {
            return Err(ConfigError::parameter("max_time_step", self.max_time_step));
        }
        Ok(())
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PolarGridConfig::default().validate().is_ok());
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimension_is_fatal() {
        let config = TrackerConfig {
            grid: VoxelGridConfig {
                dims: [10, 0, 10],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDimension { axis: "dim_y" })
        );
    }

    #[test]
    fn test_negative_cell_size_is_fatal() {
        let config = PolarGridConfig {
            cell_size_z: -0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCellSize { axis: "cell_size_z", .. })
        ));
    }

    #[test]
    fn test_unsampleable_max_velocity_is_fatal() {
        let mut config = TrackerConfig::default();
        config.spawn.max_velocity = [1.0, 1e308, 1.0];
        assert_eq!(
            config.validate(),
            Err(ConfigError::parameter("max_velocity", 1e308))
        );

        config.spawn.max_velocity = [1.0, f64::INFINITY, 1.0];
        assert!(config.validate().is_err());

        config.spawn.max_velocity = [1.0, MAX_PARTICLE_SPEED, 1.0];
        assert!(config.validate().is_ok());
        config.spawn.max_velocity = [1.0, f64::NAN, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_override() {
        let config = TrackerConfig::from_json_str(
            r#"{
                "grid": { "dims": [8, 4, 8] },
                "segmentation": { "connectivity": "six", "speed_method": "histogram" },
                "obstacles": { "min_voxels_per_obstacle": 2, "speed_source": "per_obstacle" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.grid.dims, [8, 4, 8]);
        assert_eq!(config.grid.cell_size, VoxelGridConfig::default().cell_size);
        assert_eq!(config.segmentation.connectivity, Connectivity::Six);
        assert_eq!(config.segmentation.speed_method, SpeedMethod::Histogram);
        assert_eq!(config.obstacles.min_voxels_per_obstacle, 2);
        assert_eq!(config.obstacles.speed_source, ObstacleSpeedSource::PerObstacle);
    }

    #[test]
    fn test_json_fixed_radii() {
        let config = PolarGridConfig::from_json_str(
            r#"{ "rows": 10, "cols": 10, "radii": { "fixed": { "x": 1, "z": 2 } } }"#,
        )
        .unwrap();
        assert_eq!(config.radii, SmoothingRadii::Fixed { x: 1, z: 2 });
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = TrackerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));

        let err = TrackerConfig::from_json_str(r#"{ "spawn": { "thresh_prob_for_creation": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { .. }));
    }
}
