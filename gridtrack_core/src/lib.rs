//! GridTrack Core - Occupancy Grids, Particles and Obstacle Tracking
//!
//! Turns stereo point clouds into a discretised occupancy picture and a
//! population of particles that carries the scene's motion:
//! 1. **Binary map**: project the cloud onto the grid (polar 2-D or voxel 3-D)
//! 2. **Estimator**: neighbourhood-smoothed occupancy plus particle spawning
//! 3. **Tracking** (3-D): predict, reconcile with evidence, segment, aggregate,
//!    associate, filter, join and estimate obstacle velocity
//!
//! Point types and transform lookup come from `gridtrack_env`.

pub mod binary_map;
pub mod camera;
pub mod config;
pub mod error;
pub mod estimator;
pub mod grid;
pub mod particle;
pub mod polar_tracking;
pub mod session;
pub mod tracking;

// Re-export key types for convenience
pub use binary_map::{build_polar_binary_map, build_voxel_measurement, BinaryMap, VoxelMeasurement};
pub use camera::{CameraParams, ImagePoint};
pub use config::{
    Connectivity, ObstacleConfig, ObstacleSpeedSource, ParticleDynamicsConfig, PolarGridConfig,
    SegmentationConfig, SmoothingRadii, SpawnConfig, SpeedMethod, TrackerConfig, VoxelGridConfig,
};
pub use error::{ConfigError, GridError};
pub use estimator::{estimate_polar, estimate_voxels, EstimateStats, SpawnContext};
pub use grid::{
    enforce_particle_cap, relocate_particles, remove_escaped_particles, Cell, CellState, Extent,
    PolarGrid, SpatialGrid, Voxel, VoxelGrid, VoxelIndex,
};
pub use particle::{Particle, ParticleId, ParticleIdAllocator};
pub use polar_tracking::{PolarFrameReport, PolarGridTracking};
pub use session::{FrameOutcome, TrackingSession};
pub use tracking::{FrameReport, FrameStats, Obstacle, ObstacleId, ObstacleState, VoxelGridTracker};
