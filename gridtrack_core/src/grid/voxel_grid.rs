//! The 3-D voxel grid.

use nalgebra::Vector3;

use super::{Extent, SpatialGrid, Voxel, VoxelIndex};
use crate::config::{Connectivity, VoxelGridConfig};
use crate::error::ConfigError;

/// Dense `dim_x × dim_y × dim_z` grid of [`Voxel`]s.
///
/// Flat layout is x-fastest: `x + dim_x · (y + dim_y · z)`.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    dims: [u32; 3],
    min: Vector3<f64>,
    cell_size: Vector3<f64>,
    voxels: Vec<Voxel>,
}

impl VoxelGrid {
    pub fn new(config: &VoxelGridConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let [dx, dy, dz] = config.dims;
        let voxels = (0..dz)
            .flat_map(|z| (0..dy).flat_map(move |y| (0..dx).map(move |x| VoxelIndex::new(x, y, z))))
            .map(Voxel::new)
            .collect();

        Ok(Self {
            dims: config.dims,
            min: Vector3::from(config.min),
            cell_size: Vector3::from(config.cell_size),
            voxels,
        })
    }

    #[inline]
    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn min(&self) -> Vector3<f64> {
        self.min
    }

    pub fn max(&self) -> Vector3<f64> {
        self.min
            + self.cell_size.component_mul(&Vector3::new(
                self.dims[0] as f64,
                self.dims[1] as f64,
                self.dims[2] as f64,
            ))
    }

    pub fn cell_size(&self) -> Vector3<f64> {
        self.cell_size
    }

    /// Physical volume of one voxel.
    pub fn voxel_volume(&self) -> f64 {
        self.cell_size.x * self.cell_size.y * self.cell_size.z
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    /// Centre of the voxel at `flat`.
    pub fn center(&self, flat: usize) -> Vector3<f64> {
        self.extent(flat).center()
    }

    /// Physical extent covered by an inclusive index-space box.
    pub fn extent_of_box(&self, lo: VoxelIndex, hi: VoxelIndex) -> Extent {
        let corner = |i: VoxelIndex| {
            self.min
                + self
                    .cell_size
                    .component_mul(&Vector3::new(i.x as f64, i.y as f64, i.z as f64))
        };
        Extent::new(
            corner(lo),
            corner(VoxelIndex::new(hi.x + 1, hi.y + 1, hi.z + 1)),
        )
    }

    /// Flat indices of in-bounds neighbours of `flat` under `connectivity`.
    pub fn neighbors(&self, flat: usize, connectivity: Connectivity) -> Vec<usize> {
        let center = self.grid_index(flat);
        let max_manhattan = match connectivity {
            Connectivity::Six => 1,
            Connectivity::Eighteen => 2,
            Connectivity::TwentySix => 3,
        };
        let mut out = Vec::with_capacity(26);
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let manhattan = dx.abs() + dy.abs() + dz.abs();
                    if manhattan == 0 || manhattan > max_manhattan {
                        continue;
                    }
                    if let Some(n) = center
                        .offset(dx, dy, dz)
                        .and_then(|idx| self.flat_index(idx))
                    {
                        out.push(n);
                    }
                }
            }
        }
        out
    }

    /// Resets every voxel (particles, occupancy, tags).
    pub fn clear(&mut self) {
        for voxel in &mut self.voxels {
            voxel.reset();
        }
    }
}

impl SpatialGrid for VoxelGrid {
    type Index = VoxelIndex;
    type Unit = Voxel;

    fn len(&self) -> usize {
        self.voxels.len()
    }

    fn units(&self) -> &[Voxel] {
        &self.voxels
    }

    fn units_mut(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    fn flat_index(&self, idx: VoxelIndex) -> Option<usize> {
        let [dx, dy, dz] = self.dims;
        if idx.x < dx && idx.y < dy && idx.z < dz {
            Some(idx.x as usize + dx as usize * (idx.y as usize + dy as usize * idx.z as usize))
        } else {
            None
        }
    }

    fn grid_index(&self, flat: usize) -> VoxelIndex {
        let dx = self.dims[0] as usize;
        let dy = self.dims[1] as usize;
        VoxelIndex::new(
            (flat % dx) as u32,
            ((flat / dx) % dy) as u32,
            (flat / (dx * dy)) as u32,
        )
    }

    fn extent(&self, flat: usize) -> Extent {
        let idx = self.grid_index(flat);
        self.extent_of_box(idx, idx)
    }

    fn locate(&self, p: &Vector3<f64>) -> Option<usize> {
        let rel = (p - self.min).component_div(&self.cell_size);
        let mut idx = [0u32; 3];
        for axis in 0..3 {
            let f = rel[axis].floor();
            if !(f >= 0.0 && f < self.dims[axis] as f64) {
                return None;
            }
            idx[axis] = f as u32;
        }
        self.flat_index(VoxelIndex::new(idx[0], idx[1], idx[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellState;
    use approx::assert_relative_eq;

    fn grid() -> VoxelGrid {
        VoxelGrid::new(&VoxelGridConfig {
            dims: [4, 3, 5],
            min: [-2.0, -1.0, 0.0],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap()
    }

    #[test]
    fn test_index_round_trip_covers_grid() {
        let grid = grid();
        assert_eq!(grid.len(), 60);
        for flat in 0..grid.len() {
            let idx = grid.grid_index(flat);
            assert_eq!(grid.flat_index(idx), Some(flat));
            assert_eq!(grid.voxels()[flat].index(), idx);
        }
        assert!(grid.flat_index(VoxelIndex::new(4, 0, 0)).is_none());
    }

    #[test]
    fn test_locate_and_center() {
        let grid = grid();
        let flat = grid.flat_index(VoxelIndex::new(1, 2, 3)).unwrap();
        let c = grid.center(flat);

        assert_relative_eq!(c, Vector3::new(-0.5, 1.5, 3.5));
        assert_eq!(grid.locate(&c), Some(flat));
        assert_eq!(grid.locate(&Vector3::new(2.0, 0.0, 0.0)), None);
        assert_eq!(grid.locate(&Vector3::new(0.0, 0.0, -0.01)), None);
        assert_relative_eq!(grid.max(), Vector3::new(2.0, 2.0, 5.0));
    }

    #[test]
    fn test_neighbor_counts_by_connectivity() {
        let grid = grid();
        let inner = grid.flat_index(VoxelIndex::new(1, 1, 2)).unwrap();
        let corner = grid.flat_index(VoxelIndex::new(0, 0, 0)).unwrap();

        assert_eq!(grid.neighbors(inner, Connectivity::Six).len(), 6);
        assert_eq!(grid.neighbors(inner, Connectivity::Eighteen).len(), 18);
        assert_eq!(grid.neighbors(inner, Connectivity::TwentySix).len(), 26);
        assert_eq!(grid.neighbors(corner, Connectivity::Six).len(), 3);
        assert_eq!(grid.neighbors(corner, Connectivity::TwentySix).len(), 7);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut grid = grid();
        grid.voxels_mut()[5].set_occupied_prob(0.7);
        grid.voxels_mut()[5].set_point_count(3);
        grid.voxels_mut()[5].set_obstacle(Some(2));
        grid.clear();

        let v = &grid.voxels()[5];
        assert_eq!(v.occupied_prob(), 0.0);
        assert_eq!(v.point_count(), 0);
        assert_eq!(v.obstacle(), None);
        assert_eq!(v.index(), grid.grid_index(5));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let config = VoxelGridConfig {
            dims: [0, 1, 1],
            ..Default::default()
        };
        assert!(VoxelGrid::new(&config).is_err());
    }
}
