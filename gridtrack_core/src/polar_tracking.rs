//! The 2-D polar occupancy driver: binary map then estimator, per frame.

use std::time::Instant;

use gridtrack_env::ColoredPoint;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binary_map::build_polar_binary_map;
use crate::config::PolarGridConfig;
use crate::error::ConfigError;
use crate::estimator::{estimate_polar, EstimateStats, SpawnContext};
use crate::grid::{enforce_particle_cap, remove_escaped_particles, PolarGrid, SpatialGrid};
use crate::particle::ParticleIdAllocator;

/// Summary of one polar frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarFrameReport {
    pub frame: u64,
    pub points: usize,
    pub estimate: EstimateStats,
    /// Particles alive after the frame
    pub particles: usize,
    pub elapsed_ms: f64,
}

/// Owns a polar grid and runs the occupancy estimator on incoming clouds.
#[derive(Debug)]
pub struct PolarGridTracking {
    config: PolarGridConfig,
    grid: PolarGrid,
    particle_ids: ParticleIdAllocator,
    frame: u64,
}

impl PolarGridTracking {
    pub fn new(config: PolarGridConfig) -> Result<Self, ConfigError> {
        let grid = PolarGrid::from_config(&config)?;
        Ok(Self {
            config,
            grid,
            particle_ids: ParticleIdAllocator::new(),
            frame: 0,
        })
    }

    pub fn grid(&self) -> &PolarGrid {
        &self.grid
    }

    pub fn config(&self) -> &PolarGridConfig {
        &self.config
    }

    /// Builds the binary map of `points` and updates every cell.
    ///
    /// Particle drift and the per-cell cap are not handled here; see
    /// [`remove_escaped_particles`](Self::remove_escaped_particles) and
    /// [`enforce_particle_cap`](Self::enforce_particle_cap).
    pub fn compute(&mut self, points: &[ColoredPoint]) -> PolarFrameReport {
        let started = Instant::now();
        let map = build_polar_binary_map(points, &self.grid);
        let ctx = SpawnContext {
            config: &self.config.spawn,
            ids: &self.particle_ids,
            seed: self.config.seed,
            frame: self.frame,
        };
        let estimate = estimate_polar(&mut self.grid, &map, &ctx);

        let report = PolarFrameReport {
            frame: self.frame,
            points: points.len(),
            estimate,
            particles: self.grid.particle_count(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1e3,
        };
        debug!(
            "polar frame {}: occupied={} spawned={} ({:.2}ms)",
            report.frame, estimate.occupied_units, estimate.spawned_particles, report.elapsed_ms
        );
        self.frame += 1;
        report
    }

    /// Drops particles that have left the grid.
    pub fn remove_escaped_particles(&mut self) -> usize {
        remove_escaped_particles(&mut self.grid)
    }

    /// Culls every cell to `max_particles_per_cell`.
    pub fn enforce_particle_cap(&mut self) -> usize {
        enforce_particle_cap(&mut self.grid, self.config.max_particles_per_cell)
    }
}
