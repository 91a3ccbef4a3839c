//! Point cloud → per-frame binary occupancy.
//!
//! Both builders are pure: they read the grid's geometry, never its state,
//! and produce a fresh snapshot every frame. Points that fall outside the
//! grid (including NaN/infinite coordinates) are dropped silently.

use gridtrack_env::ColoredPoint;
use rayon::prelude::*;

use crate::grid::{PolarGrid, SpatialGrid, VoxelGrid};

// ============================================================================
// POLAR (2-D)
// ============================================================================

/// Boolean occupied/free snapshot with the polar grid's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMap {
    rows: u32,
    cols: u32,
    data: Vec<bool>,
}

impl BinaryMap {
    /// An all-free map.
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            data: vec![false; rows as usize * cols as usize],
        }
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Occupancy at `(row, col)`; out-of-range reads as free.
    #[inline]
    pub fn get(&self, row: u32, col: u32) -> bool {
        row < self.rows && col < self.cols && self.data[(row * self.cols + col) as usize]
    }

    pub fn set(&mut self, row: u32, col: u32, occupied: bool) {
        if row < self.rows && col < self.cols {
            self.data[(row * self.cols + col) as usize] = occupied;
        }
    }

    /// Number of occupied cells.
    pub fn occupied_count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// Occupied cells in the inclusive window `[r0, r1] × [c0, c1]`.
    pub fn count_window(&self, r0: u32, r1: u32, c0: u32, c1: u32) -> u32 {
        let mut total = 0;
        for row in r0..=r1.min(self.rows.saturating_sub(1)) {
            let base = (row * self.cols) as usize;
            for col in c0..=c1.min(self.cols.saturating_sub(1)) {
                if self.data[base + col as usize] {
                    total += 1;
                }
            }
        }
        total
    }
}

/// Projects one point onto the polar grid.
///
/// Lateral index `(x − minX) · cols / (maxX − minX)`, depth index
/// `z · rows / (rows · cellSizeZ)`, both truncated. Accepted only when
/// `0 < index < dim`: the zero row/column and the far boundary never
/// receive points.
pub fn polar_cell_of(point: &ColoredPoint, grid: &PolarGrid) -> Option<(u32, u32)> {
    let rows = grid.rows() as f64;
    let cols = grid.cols() as f64;
    let max_z = grid.max_z();
    let (min_x, max_x) = (grid.min_x(), grid.max_x());

    let factor_x = cols / (max_x - min_x);
    let factor_z = rows / max_z;

    let x_pos = ((point.x as f64 - min_x) * factor_x).trunc();
    let z_pos = (point.z as f64 * factor_z).trunc();

    if x_pos > 0.0 && x_pos < cols && z_pos > 0.0 && z_pos < rows {
        Some((z_pos as u32, x_pos as u32))
    } else {
        None
    }
}

/// Builds the binary occupancy map of a point cloud over `grid`.
pub fn build_polar_binary_map(points: &[ColoredPoint], grid: &PolarGrid) -> BinaryMap {
    let hits: Vec<(u32, u32)> = points
        .par_iter()
        .filter_map(|p| polar_cell_of(p, grid))
        .collect();

    let mut map = BinaryMap::new(grid.rows(), grid.cols());
    for (row, col) in hits {
        map.set(row, col, true);
    }
    map
}

// ============================================================================
// VOXEL (3-D)
// ============================================================================

/// Per-voxel raw point counts for one frame; a voxel is occupied when its
/// count is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelMeasurement {
    dims: [u32; 3],
    counts: Vec<u32>,
}

impl VoxelMeasurement {
    /// An all-free measurement.
    pub fn empty(dims: [u32; 3]) -> Self {
        Self {
            dims,
            counts: vec![0; dims.iter().map(|&d| d as usize).product()],
        }
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    #[inline]
    pub fn count(&self, flat: usize) -> u32 {
        self.counts.get(flat).copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_occupied(&self, flat: usize) -> bool {
        self.count(flat) > 0
    }

    /// Marks `flat` as hit once more.
    pub fn add_hit(&mut self, flat: usize) {
        if let Some(c) = self.counts.get_mut(flat) {
            *c += 1;
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Total points that landed inside the grid.
    pub fn total_points(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Occupied voxels in the inclusive index box `lo..=hi` (clamped).
    pub fn count_window(&self, lo: [u32; 3], hi: [u32; 3]) -> u32 {
        let [dx, dy, dz] = self.dims;
        let (dx, dy) = (dx as usize, dy as usize);
        let mut total = 0;
        for z in lo[2]..=hi[2].min(dz.saturating_sub(1)) {
            for y in lo[1]..=hi[1].min(dy as u32 - 1) {
                let base = dx * (y as usize + dy * z as usize);
                for x in lo[0]..=hi[0].min(dx as u32 - 1) {
                    if self.counts[base + x as usize] > 0 {
                        total += 1;
                    }
                }
            }
        }
        total
    }
}

/// Bins a point cloud into the voxel grid (half-open `[min, max)` per axis).
pub fn build_voxel_measurement(points: &[ColoredPoint], grid: &VoxelGrid) -> VoxelMeasurement {
    let hits: Vec<usize> = points
        .par_iter()
        .filter(|p| p.is_finite())
        .filter_map(|p| grid.locate(&p.position()))
        .collect();

    let mut measurement = VoxelMeasurement::empty(grid.dims());
    for flat in hits {
        measurement.add_hit(flat);
    }
    measurement
}
