//! Measurement-based update: reconcile the particle population with the new
//! voxel evidence.

use std::ops::Range;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::binary_map::VoxelMeasurement;
use crate::camera::CameraParams;
use crate::config::{ParticleDynamicsConfig, SpawnConfig};
use crate::estimator::{spawn_voxel_particles, unit_rng, update_voxel_occupancy, SpawnContext};
use crate::grid::{enforce_particle_cap, CellState, SpatialGrid, VoxelGrid};
use crate::particle::{Particle, ParticleId};

/// Particle bookkeeping for one measurement update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementStats {
    /// Removed because their voxel was observed free or weak
    pub contradicted: usize,
    /// Removed for exceeding the maximum age
    pub expired: usize,
    /// Cloned into under-populated occupied voxels
    pub resampled: usize,
    /// Spawned into empty occupied voxels
    pub spawned: usize,
    /// Removed by the per-voxel cap
    pub culled: usize,
}

/// Parameters of the measurement update.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementParams<'a> {
    pub radii: [u32; 3],
    pub dynamics: &'a ParticleDynamicsConfig,
    pub camera: Option<&'a CameraParams>,
}

/// Full measurement update for one frame.
///
/// 1. occupancy probability and point count per voxel,
/// 2. removal of contradicted and expired particles, ageing of the rest,
/// 3. resampling of occupied voxels up to `particles_per_cell`,
/// 4. spawning in occupied, empty voxels,
/// 5. the per-voxel cap.
pub fn measurement_update(
    grid: &mut VoxelGrid,
    measurement: &VoxelMeasurement,
    params: &MeasurementParams<'_>,
    ctx: &SpawnContext<'_>,
) -> MeasurementStats {
    update_voxel_occupancy(grid, measurement, params.radii);

    let (contradicted, expired) = prune_particles(
        grid,
        measurement,
        ctx.config.thresh_prob_for_creation,
        params.dynamics.max_particle_age,
        params.camera,
    );
    let resampled = resample_particles(grid, measurement, params.dynamics.velocity_noise, ctx);
    let (_, spawned) = spawn_voxel_particles(grid, measurement, ctx);
    let culled = enforce_particle_cap(grid, params.dynamics.max_particles_per_voxel);

    MeasurementStats {
        contradicted,
        expired,
        resampled,
        spawned,
        culled,
    }
}

/// Removes particles contradicted by the evidence, then ages the survivors
/// and drops those older than `max_age`.
///
/// A voxel contradicts its particles when it is observed (inside the camera
/// field of view, or always without a camera) and is either free in the
/// measurement or its probability is at or below `thresh`.
///
/// Returns `(contradicted, expired)`.
pub fn prune_particles(
    grid: &mut VoxelGrid,
    measurement: &VoxelMeasurement,
    thresh: f64,
    max_age: u32,
    camera: Option<&CameraParams>,
) -> (usize, usize) {
    let observed: Vec<bool> = (0..grid.len())
        .map(|i| camera.map_or(true, |c| c.is_visible(&grid.center(i))))
        .collect();

    grid.voxels_mut()
        .par_iter_mut()
        .enumerate()
        .map(|(i, voxel)| {
            if voxel.is_empty() {
                return (0, 0);
            }
            let weak = !measurement.is_occupied(i) || voxel.occupied_prob() <= thresh;
            let particles = voxel.particles_mut();
            if observed[i] && weak {
                let n = particles.len();
                particles.clear();
                return (n, 0);
            }
            for p in particles.iter_mut() {
                p.age += 1;
            }
            let before = particles.len();
            particles.retain(|p| p.age <= max_age);
            (0, before - particles.len())
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
}

/// Refills occupied voxels that hold fewer than `particles_per_cell`
/// particles by cloning random survivors with Gaussian velocity diffusion.
///
/// Returns the number of particles added.
pub fn resample_particles(
    grid: &mut VoxelGrid,
    measurement: &VoxelMeasurement,
    velocity_noise: f64,
    ctx: &SpawnContext<'_>,
) -> usize {
    let SpawnConfig { particles_per_cell, .. } = *ctx.config;

    let deficits: Vec<(usize, usize)> = grid
        .voxels()
        .iter()
        .enumerate()
        .filter(|(i, v)| measurement.is_occupied(*i) && !v.is_empty())
        .filter_map(|(i, v)| {
            let have = v.particles().len();
            (have < particles_per_cell).then(|| (i, particles_per_cell - have))
        })
        .collect();
    let total: usize = deficits.iter().map(|&(_, n)| n).sum();
    if total == 0 {
        return 0;
    }

    let block = ctx.ids.reserve(total);
    let mut ranges: Vec<(usize, Range<ParticleId>)> = Vec::with_capacity(deficits.len());
    let mut next = block.start;
    for (i, n) in deficits {
        ranges.push((i, next..next + n as u64));
        next += n as u64;
    }

    let noise = Normal::new(0.0, velocity_noise).ok();
    let stream_base = grid.len() as u64;
    let voxels = grid.voxels_mut();
    ranges
        .into_iter()
        .map(|(i, ids)| {
            let mut rng = unit_rng(ctx.seed, ctx.frame, stream_base + i as u64);
            let particles = voxels[i].particles_mut();
            let parents = particles.len();
            let mut added = 0;
            for id in ids {
                let parent = &particles[rng.gen_range(0..parents)];
                let mut velocity = parent.velocity;
                if let Some(noise) = &noise {
                    for axis in 0..3 {
                        velocity[axis] += noise.sample(&mut rng);
                    }
                }
                let child = Particle::new(id, parent.position, velocity);
                particles.push(child);
                added += 1;
            }
            added
        })
        .sum()
}
