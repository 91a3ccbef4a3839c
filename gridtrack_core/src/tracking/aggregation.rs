//! Aggregation: merge nearby, co-moving segments into obstacle candidates.

use nalgebra::Vector3;

use super::obstacle::VoxelCluster;
use super::speed::is_coherent;
use crate::config::SegmentationConfig;
use crate::grid::VoxelGrid;

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Mean main vector over a segment's voxels.
fn segment_velocity(voxels: &[usize], grid: &VoxelGrid) -> Vector3<f64> {
    let (sum, n) = voxels
        .iter()
        .filter_map(|&i| grid.voxels()[i].main_vector())
        .fold((Vector3::zeros(), 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        Vector3::zeros()
    } else {
        sum / n as f64
    }
}

/// Joins segments whose bounding boxes touch after a one-voxel dilation and
/// whose mean velocities are coherent.
///
/// Candidates come out ordered by their lowest member segment.
pub fn aggregate(segments: Vec<Vec<usize>>, grid: &VoxelGrid, config: &SegmentationConfig) -> Vec<VoxelCluster> {
    let clusters: Vec<VoxelCluster> = segments
        .into_iter()
        .filter_map(|s| VoxelCluster::new(s, grid))
        .collect();
    let velocities: Vec<Vector3<f64>> = clusters
        .iter()
        .map(|c| segment_velocity(&c.voxels, grid))
        .collect();

    let mut sets = UnionFind::new(clusters.len());
    for i in 0..clusters.len() {
        for j in (i + 1)..clusters.len() {
            if clusters[i].boxes_touch(&clusters[j], 1)
                && is_coherent(&velocities[i], &velocities[j], config)
            {
                sets.union(i, j);
            }
        }
    }

    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for (i, cluster) in clusters.into_iter().enumerate() {
        let root = sets.find(i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, voxels)) => voxels.extend(cluster.voxels),
            None => groups.push((root, cluster.voxels)),
        }
    }

    groups
        .into_iter()
        .filter_map(|(_, voxels)| VoxelCluster::new(voxels, grid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoxelGridConfig;
    use crate::grid::{SpatialGrid, VoxelIndex};

    fn grid_with(vectors: &[(VoxelIndex, Vector3<f64>)]) -> VoxelGrid {
        let mut grid = VoxelGrid::new(&VoxelGridConfig {
            dims: [8, 8, 8],
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

    fn flat(grid: &VoxelGrid, x: u32, y: u32, z: u32) -> usize {
        grid.flat_index(VoxelIndex::new(x, y, z)).unwrap()
    }

    #[test]
    fn test_union_find() {
        let mut sets = UnionFind::new(4);
        sets.union(0, 1);
        sets.union(2, 3);
        assert_eq!(sets.find(0), sets.find(1));
        assert_ne!(sets.find(1), sets.find(2));
        sets.union(1, 3);
        assert_eq!(sets.find(0), sets.find(2));
    }

    #[test]
    fn test_gap_of_one_voxel_is_bridged() {
        let fwd = Vector3::new(0.0, 0.0, 1.0);
        let grid = grid_with(&[
            (VoxelIndex::new(1, 1, 1), fwd),
            (VoxelIndex::new(3, 1, 1), fwd),
        ]);
        let segments = vec![vec![flat(&grid, 1, 1, 1)], vec![flat(&grid, 3, 1, 1)]];

        let candidates = aggregate(segments, &grid, &SegmentationConfig::default());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].len(), 2);
    }

    #[test]
    fn test_distant_or_opposed_segments_stay_apart() {
        let fwd = Vector3::new(0.0, 0.0, 1.0);
        let back = Vector3::new(0.0, 0.0, -1.0);
        let grid = grid_with(&[
            (VoxelIndex::new(1, 1, 1), fwd),
            (VoxelIndex::new(5, 1, 1), fwd),
            (VoxelIndex::new(2, 1, 1), back),
        ]);
        let segments = vec![
            vec![flat(&grid, 1, 1, 1)],
            vec![flat(&grid, 2, 1, 1)],
            vec![flat(&grid, 5, 1, 1)],
        ];

        let candidates = aggregate(segments, &grid, &SegmentationConfig::default());

        assert_eq!(candidates.len(), 3);
    }
}
