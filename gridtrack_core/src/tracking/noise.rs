//! Noise removal: drop candidates too small or too weakly supported.

use super::obstacle::VoxelCluster;
use crate::config::ObstacleConfig;
use crate::grid::VoxelGrid;

/// Whether a candidate survives noise removal.
///
/// Needs at least `min_voxels_per_obstacle` voxels and a mean voxel
/// occupancy of at least `min_voxel_density`.
pub fn is_signal(candidate: &VoxelCluster, grid: &VoxelGrid, config: &ObstacleConfig) -> bool {
    candidate.len() >= config.min_voxels_per_obstacle
        && candidate.mean_occupancy(grid) >= config.min_voxel_density
}

/// Keeps the candidates that are signal. Returns survivors and the number
/// discarded.
pub fn remove_noise(
    candidates: Vec<VoxelCluster>,
    grid: &VoxelGrid,
    config: &ObstacleConfig,
) -> (Vec<VoxelCluster>, usize) {
    let before = candidates.len();
    let kept: Vec<VoxelCluster> = candidates
        .into_iter()
        .filter(|c| is_signal(c, grid, config))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoxelGridConfig;
    use crate::grid::{CellState, SpatialGrid};

    fn grid() -> VoxelGrid {
        VoxelGrid::new(&VoxelGridConfig {
            dims: [10, 1, 1],
            min: [0.0, 0.0, 0.0],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap()
    }

    #[test]
    fn test_two_voxel_candidate_is_discarded() {
        let grid = grid();
        let small = VoxelCluster::new(vec![0, 1], &grid).unwrap();
        let large = VoxelCluster::new(vec![3, 4, 5, 6, 7], &grid).unwrap();
        let config = ObstacleConfig {
            min_voxels_per_obstacle: 5,
            ..Default::default()
        };

        let (kept, removed) = remove_noise(vec![small, large.clone()], &grid, &config);

        assert_eq!(removed, 1);
        assert_eq!(kept, vec![large]);
    }

    #[test]
    fn test_weak_occupancy_is_discarded() {
        let mut grid = grid();
        for (i, voxel) in grid.units_mut().iter_mut().enumerate() {
            voxel.set_occupied_prob(if i < 5 { 0.1 } else { 0.6 });
        }
        let weak = VoxelCluster::new(vec![0, 1, 2], &grid).unwrap();
        let strong = VoxelCluster::new(vec![5, 6, 7], &grid).unwrap();
        let config = ObstacleConfig {
            min_voxels_per_obstacle: 1,
            min_voxel_density: 0.5,
            ..Default::default()
        };

        assert!(!is_signal(&weak, &grid, &config));
        assert!(is_signal(&strong, &grid, &config));
    }
}
