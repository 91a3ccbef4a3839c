//! Segmentation: connected components of voxels with coherent motion.

use std::collections::VecDeque;

use super::speed::is_coherent;
use crate::config::SegmentationConfig;
use crate::grid::VoxelGrid;

/// Partitions voxels that carry a main vector into connected segments.
///
/// Two neighbouring voxels (under the configured connectivity) join the
/// same segment only when their main vectors are coherent. Segments are
/// returned in order of their lowest voxel, each sorted ascending.
pub fn segment(grid: &VoxelGrid, config: &SegmentationConfig) -> Vec<Vec<usize>> {
    let voxels = grid.voxels();
    let mut visited = vec![false; voxels.len()];
    let mut segments = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..voxels.len() {
        if visited[seed] || voxels[seed].main_vector().is_none() {
            continue;
        }
        visited[seed] = true;
        queue.push_back(seed);
        let mut members = Vec::new();

        while let Some(current) = queue.pop_front() {
            members.push(current);
            let Some(here) = voxels[current].main_vector() else {
                continue;
            };
            for n in grid.neighbors(current, config.connectivity) {
                if visited[n] {
                    continue;
                }
                let Some(there) = voxels[n].main_vector() else {
                    continue;
                };
                if is_coherent(&here, &there, config) {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        members.sort_unstable();
        segments.push(members);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Connectivity, VoxelGridConfig};
    use crate::grid::{SpatialGrid, VoxelIndex};
    use nalgebra::Vector3;

    fn grid_with(vectors: &[(VoxelIndex, Vector3<f64>)]) -> VoxelGrid {
        let mut grid = VoxelGrid::new(&VoxelGridConfig {
            dims: [6, 6, 6],
            min: [0.0, 0.0, 0.0],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap();
        for &(idx, v) in vectors {
            let flat = grid.flat_index(idx).unwrap();
            grid.voxels_mut()[flat].set_main_vector(Some(v));
        }
        grid
    }

    #[test]
    fn test_empty_grid_has_no_segments() {
        let grid = grid_with(&[]);
        assert!(segment(&grid, &SegmentationConfig::default()).is_empty());
    }

    #[test]
    fn test_coherent_neighbours_form_one_segment() {
        let fwd = Vector3::new(0.0, 0.0, 1.0);
        let grid = grid_with(&[
            (VoxelIndex::new(1, 1, 1), fwd),
            (VoxelIndex::new(2, 1, 1), fwd),
            (VoxelIndex::new(3, 2, 1), fwd),
        ]);

        let segments = segment(&grid, &SegmentationConfig::default());

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 3);
    }

    #[test]
    fn test_connectivity_controls_diagonals() {
        let fwd = Vector3::new(0.0, 0.0, 1.0);
        let grid = grid_with(&[
            (VoxelIndex::new(1, 1, 1), fwd),
            (VoxelIndex::new(2, 2, 2), fwd),
        ]);
        let six = SegmentationConfig {
            connectivity: Connectivity::Six,
            ..Default::default()
        };

        assert_eq!(segment(&grid, &six).len(), 2);
        assert_eq!(segment(&grid, &SegmentationConfig::default()).len(), 1);
    }

    #[test]
    fn test_incoherent_neighbours_split() {
        let grid = grid_with(&[
            (VoxelIndex::new(1, 1, 1), Vector3::new(0.0, 0.0, 1.0)),
            (VoxelIndex::new(2, 1, 1), Vector3::new(0.0, 0.0, -1.0)),
        ]);

        let segments = segment(&grid, &SegmentationConfig::default());

        assert_eq!(segments.len(), 2);
        assert!(segments[0][0] < segments[1][0]);
    }
}
