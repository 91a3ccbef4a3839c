//! Occupancy & particle estimator.
//!
//! Every unit's occupancy probability is the fraction of occupied map entries
//! in its neighbourhood window, normalised by the *nominal* window size. The
//! window is clamped at the grid edges but the denominator is not, so edge
//! units read lower than interior ones.
//!
//! The probability pass writes only the unit it visits and reads the binary
//! map, so it runs over all units in parallel. Spawning is gated on "unit holds
//! no particles", which makes a repeated call on the same map a no-op.

use std::ops::Range;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::binary_map::{BinaryMap, VoxelMeasurement};
use crate::config::SpawnConfig;
use crate::grid::{CellState, Extent, PolarGrid, SpatialGrid, VoxelGrid};
use crate::particle::{spawn_uniform, Particle, ParticleId, ParticleIdAllocator};

/// Everything the spawn policy needs besides the grid itself.
#[derive(Debug, Clone, Copy)]
pub struct SpawnContext<'a> {
    pub config: &'a SpawnConfig,
    pub ids: &'a ParticleIdAllocator,
    pub seed: u64,
    /// Frame counter; mixes into per-unit random streams
    pub frame: u64,
}

/// Outcome of one estimator pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateStats {
    /// Units marked occupied by the raw map
    pub occupied_units: usize,
    /// Units that received new particles
    pub spawned_units: usize,
    pub spawned_particles: usize,
}

/// Deterministic random stream for one grid unit within one frame.
///
/// Streams do not depend on thread scheduling.
pub(crate) fn unit_rng(seed: u64, frame: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ frame.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    rng.set_stream(stream);
    rng
}

// ============================================================================
// POLAR (2-D)
// ============================================================================

/// Smoothed probability of the polar cell at `(row, col)` with radii
/// `(sigma_x, sigma_z)`.
pub fn smoothed_cell_prob(map: &BinaryMap, row: u32, col: u32, sigma_x: u32, sigma_z: u32) -> f64 {
    let count = map.count_window(
        row.saturating_sub(sigma_z),
        row.saturating_add(sigma_z),
        col.saturating_sub(sigma_x),
        col.saturating_add(sigma_x),
    );
    let nominal = (2.0 * sigma_z as f64 + 1.0) * (2.0 * sigma_x as f64 + 1.0);
    count as f64 / nominal
}

/// Updates every polar cell's occupancy probability and spawns particles.
///
/// A cell spawns `particles_per_cell` particles when the raw map marks it
/// occupied, it holds no particles, and its probability exceeds
/// `thresh_prob_for_creation`.
pub fn estimate_polar(grid: &mut PolarGrid, map: &BinaryMap, ctx: &SpawnContext<'_>) -> EstimateStats {
    let thresh = ctx.config.thresh_prob_for_creation;

    let candidates: Vec<usize> = grid
        .cells_mut()
        .par_iter_mut()
        .enumerate()
        .filter_map(|(i, cell)| {
            let (row, col) = (cell.row(), cell.col());
            let prob = smoothed_cell_prob(map, row, col, cell.sigma_x(), cell.sigma_z());
            cell.set_occupied_prob(prob);
            (map.get(row, col) && cell.is_empty() && prob > thresh).then_some(i)
        })
        .collect();

    let spawned_particles = spawn_into(grid, &candidates, ctx);
    EstimateStats {
        occupied_units: map.occupied_count(),
        spawned_units: candidates.len(),
        spawned_particles,
    }
}

// ============================================================================
// VOXEL (3-D)
// ============================================================================

/// Updates occupancy probability and raw point count of every voxel.
///
/// `radii` are the fixed neighbourhood half-widths `[nx, ny, nz]`.
pub fn update_voxel_occupancy(grid: &mut VoxelGrid, measurement: &VoxelMeasurement, radii: [u32; 3]) {
    let nominal: f64 = radii.iter().map(|&r| 2.0 * r as f64 + 1.0).product();

    grid.voxels_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, voxel)| {
            let idx = voxel.index();
            let lo = [
                idx.x.saturating_sub(radii[0]),
                idx.y.saturating_sub(radii[1]),
                idx.z.saturating_sub(radii[2]),
            ];
            let hi = [
                idx.x.saturating_add(radii[0]),
                idx.y.saturating_add(radii[1]),
                idx.z.saturating_add(radii[2]),
            ];
            let count = measurement.count_window(lo, hi);
            voxel.set_occupied_prob(count as f64 / nominal);
            voxel.set_point_count(measurement.count(i));
        });
}

/// Spawns particles in measured, empty voxels above the creation threshold.
///
/// Returns `(voxels spawned into, particles spawned)`.
pub fn spawn_voxel_particles(
    grid: &mut VoxelGrid,
    measurement: &VoxelMeasurement,
    ctx: &SpawnContext<'_>,
) -> (usize, usize) {
    let thresh = ctx.config.thresh_prob_for_creation;
    let candidates: Vec<usize> = grid
        .voxels()
        .par_iter()
        .enumerate()
        .filter(|(i, v)| measurement.is_occupied(*i) && v.is_empty() && v.occupied_prob() > thresh)
        .map(|(i, _)| i)
        .collect();

    let spawned = spawn_into(grid, &candidates, ctx);
    (candidates.len(), spawned)
}

/// Voxel counterpart of [`estimate_polar`].
pub fn estimate_voxels(
    grid: &mut VoxelGrid,
    measurement: &VoxelMeasurement,
    radii: [u32; 3],
    ctx: &SpawnContext<'_>,
) -> EstimateStats {
    update_voxel_occupancy(grid, measurement, radii);
    let (spawned_units, spawned_particles) = spawn_voxel_particles(grid, measurement, ctx);
    EstimateStats {
        occupied_units: measurement.occupied_count(),
        spawned_units,
        spawned_particles,
    }
}

// ============================================================================
// SPAWNING
// ============================================================================

/// Fills each unit in `candidates` with `particles_per_cell` new particles.
///
/// One contiguous id block is reserved for the whole pass and split in
/// candidate order, so ids are reproducible for a given seed and frame.
fn spawn_into<G: SpatialGrid>(grid: &mut G, candidates: &[usize], ctx: &SpawnContext<'_>) -> usize {
    let per_unit = ctx.config.particles_per_cell;
    if candidates.is_empty() || per_unit == 0 {
        return 0;
    }

    let block = ctx.ids.reserve(candidates.len() * per_unit);
    let max_velocity = ctx.config.max_velocity();
    let jobs: Vec<(usize, Extent, Range<ParticleId>)> = candidates
        .iter()
        .enumerate()
        .map(|(k, &i)| {
            let start = block.start + (k * per_unit) as u64;
            (i, grid.extent(i), start..start + per_unit as u64)
        })
        .collect();

    let batches: Vec<(usize, Vec<Particle>)> = jobs
        .into_par_iter()
        .map(|(i, extent, ids)| {
            let mut rng = unit_rng(ctx.seed, ctx.frame, i as u64);
            (i, spawn_uniform(&extent, ids, &max_velocity, &mut rng))
        })
        .collect();

    let units = grid.units_mut();
    let mut total = 0;
    for (i, particles) in batches {
        total += particles.len();
        units[i].particles_mut().extend(particles);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_map::build_voxel_measurement;
    use crate::config::VoxelGridConfig;
    use approx::assert_relative_eq;
    use gridtrack_env::ColoredPoint;
    use proptest::prelude::*;

    fn spawn_config(particles_per_cell: usize) -> SpawnConfig {
        SpawnConfig {
            particles_per_cell,
            thresh_prob_for_creation: 0.05,
            max_velocity: [0.0; 3],
        }
    }

    #[test]
    fn test_single_occupied_cell_scenario() {
        let mut grid = PolarGrid::with_fixed_radii(10, 10, 1.0, 1.0, 1, 1).unwrap();
        let mut map = BinaryMap::new(10, 10);
        map.set(5, 5, true);
        let config = spawn_config(4);
        let ids = ParticleIdAllocator::new();
        let ctx = SpawnContext { config: &config, ids: &ids, seed: 1, frame: 0 };

        let stats = estimate_polar(&mut grid, &map, &ctx);

        assert_relative_eq!(grid.cell(5, 5).occupied_prob(), 1.0 / 9.0);
        assert_eq!(grid.cell(5, 5).particles().len(), 4);
        assert_eq!(grid.particle_count(), 4);
        assert_eq!(stats.spawned_units, 1);
        assert_eq!(stats.spawned_particles, 4);

        // Neighbours see the same evidence but are not themselves occupied
        assert_relative_eq!(grid.cell(4, 6).occupied_prob(), 1.0 / 9.0);
        assert_relative_eq!(grid.cell(7, 5).occupied_prob(), 0.0);

        let home = grid.flat_index((5, 5)).unwrap();
        for p in grid.cell(5, 5).particles() {
            assert_eq!(grid.locate(&p.position), Some(home));
            assert_eq!(p.velocity, nalgebra::Vector3::zeros());
        }
    }

    #[test]
    fn test_spawning_is_idempotent() {
        let mut grid = PolarGrid::with_fixed_radii(10, 10, 1.0, 1.0, 1, 1).unwrap();
        let mut map = BinaryMap::new(10, 10);
        map.set(5, 5, true);
        map.set(2, 8, true);
        let config = spawn_config(4);
        let ids = ParticleIdAllocator::new();
        let ctx = SpawnContext { config: &config, ids: &ids, seed: 1, frame: 0 };

        estimate_polar(&mut grid, &map, &ctx);
        let second = estimate_polar(&mut grid, &map, &ctx);

        assert_eq!(second.spawned_particles, 0);
        assert_eq!(grid.particle_count(), 8);
    }

    #[test]
    fn test_edge_cell_uses_nominal_denominator() {
        let mut grid = PolarGrid::with_fixed_radii(10, 10, 1.0, 1.0, 1, 1).unwrap();
        let mut map = BinaryMap::new(10, 10);
        map.set(0, 0, true);
        map.set(0, 1, true);
        map.set(1, 0, true);
        map.set(1, 1, true);
        let config = spawn_config(0);
        let ids = ParticleIdAllocator::new();
        let ctx = SpawnContext { config: &config, ids: &ids, seed: 1, frame: 0 };

        estimate_polar(&mut grid, &map, &ctx);

        // Whole clamped window is occupied, yet the corner reads 4/9
        assert_relative_eq!(grid.cell(0, 0).occupied_prob(), 4.0 / 9.0);
        assert_relative_eq!(grid.cell(1, 1).occupied_prob(), 4.0 / 9.0);
    }

    #[test]
    fn test_threshold_blocks_spawn() {
        let mut grid = PolarGrid::with_fixed_radii(10, 10, 1.0, 1.0, 2, 2).unwrap();
        let mut map = BinaryMap::new(10, 10);
        map.set(5, 5, true);
        let config = spawn_config(4);
        let ids = ParticleIdAllocator::new();
        let ctx = SpawnContext { config: &config, ids: &ids, seed: 1, frame: 0 };

        // 1/25 < 0.05
        let stats = estimate_polar(&mut grid, &map, &ctx);
        assert_eq!(stats.spawned_particles, 0);
        assert_eq!(grid.particle_count(), 0);
    }

    #[test]
    fn test_spawn_is_reproducible() {
        let run = || {
            let mut grid = PolarGrid::with_fixed_radii(10, 10, 1.0, 1.0, 0, 0).unwrap();
            let mut map = BinaryMap::new(10, 10);
            for k in 1..9 {
                map.set(k, 9 - k, true);
            }
            let config = spawn_config(3);
            let ids = ParticleIdAllocator::new();
            let ctx = SpawnContext { config: &config, ids: &ids, seed: 9, frame: 3 };
            estimate_polar(&mut grid, &map, &ctx);
            grid.cells()
                .iter()
                .flat_map(|c| c.particles().iter().map(|p| (p.id, p.position)))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_voxel_estimate_counts_and_spawns() {
        let mut grid = VoxelGrid::new(&VoxelGridConfig {
            dims: [4, 4, 4],
            min: [0.0, 0.0, 0.0],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap();
        let points = [
            ColoredPoint::new(1.5, 1.5, 1.5),
            ColoredPoint::new(1.2, 1.7, 1.1),
        ];
        let measurement = build_voxel_measurement(&points, &grid);
        let config = SpawnConfig {
            particles_per_cell: 5,
            thresh_prob_for_creation: 0.02,
            max_velocity: [1.0, 1.0, 1.0],
        };
        let ids = ParticleIdAllocator::new();
        let ctx = SpawnContext { config: &config, ids: &ids, seed: 1, frame: 0 };

        let stats = estimate_voxels(&mut grid, &measurement, [1, 1, 1], &ctx);

        let flat = grid.flat_index(crate::grid::VoxelIndex::new(1, 1, 1)).unwrap();
        let voxel = &grid.voxels()[flat];
        assert_relative_eq!(voxel.occupied_prob(), 1.0 / 27.0);
        assert_eq!(voxel.point_count(), 2);
        assert_eq!(voxel.particles().len(), 5);
        assert_eq!(stats.spawned_particles, 5);
        assert_eq!(grid.particle_count(), 5);
        assert_eq!(ids.issued(), 5);
    }

    proptest! {
        #[test]
        fn prop_probability_in_unit_range(
            occupied in proptest::collection::vec((0u32..8, 0u32..8), 0..30),
            sigma_x in 0u32..4,
            sigma_z in 0u32..4,
        ) {
            let mut grid = PolarGrid::with_fixed_radii(8, 8, 1.0, 1.0, sigma_x, sigma_z).unwrap();
            let mut map = BinaryMap::new(8, 8);
            for &(r, c) in &occupied {
                map.set(r, c, true);
            }
            let config = spawn_config(1);
            let ids = ParticleIdAllocator::new();
            let ctx = SpawnContext { config: &config, ids: &ids, seed: 0, frame: 0 };

            estimate_polar(&mut grid, &map, &ctx);

            for cell in grid.cells() {
                let prob = cell.occupied_prob();
                prop_assert!((0.0..=1.0).contains(&prob));
                let near = occupied.iter().any(|&(r, c)| {
                    r.abs_diff(cell.row()) <= sigma_z && c.abs_diff(cell.col()) <= sigma_x
                });
                if !near {
                    prop_assert_eq!(prob, 0.0);
                }
            }
        }
    }
}
