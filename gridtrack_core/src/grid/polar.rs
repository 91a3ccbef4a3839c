//! The 2-D polar occupancy grid (rows = depth, cols = lateral).

use nalgebra::Vector3;

use super::{Cell, Extent, SpatialGrid};
use crate::config::{PolarGridConfig, SmoothingRadii};
use crate::error::ConfigError;

/// Dense `rows × cols` grid of [`Cell`]s in front of the sensor.
///
/// Lateral coverage is symmetric about x = 0 (`[-cols/2·csx, cols/2·csx)`),
/// depth coverage starts at the sensor (`[0, rows·csz)`). Shape is fixed
/// after construction.
#[derive(Debug, Clone)]
pub struct PolarGrid {
    rows: u32,
    cols: u32,
    cell_size_x: f64,
    cell_size_z: f64,
    cells: Vec<Cell>,
}

impl PolarGrid {
    /// Builds the grid described by a validated configuration.
    pub fn from_config(config: &PolarGridConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (rows, cols) = (config.rows, config.cols);
        let cells = (0..rows)
            .flat_map(|z| (0..cols).map(move |x| (z, x)))
            .map(|(z, x)| match config.radii {
                SmoothingRadii::Fixed { x: sx, z: sz } => Cell::new(z, x, sx, sz),
                SmoothingRadii::FromCamera => Cell::from_camera(
                    z,
                    x,
                    config.cell_size_x,
                    config.cell_size_z,
                    &config.camera,
                ),
            })
            .collect();

        Ok(Self {
            rows,
            cols,
            cell_size_x: config.cell_size_x,
            cell_size_z: config.cell_size_z,
            cells,
        })
    }

    /// Builds a grid with the same smoothing radii in every cell.
    pub fn with_fixed_radii(
        rows: u32,
        cols: u32,
        cell_size_x: f64,
        cell_size_z: f64,
        sigma_x: u32,
        sigma_z: u32,
    ) -> Result<Self, ConfigError> {
        Self::from_config(&PolarGridConfig {
            rows,
            cols,
            cell_size_x,
            cell_size_z,
            radii: SmoothingRadii::Fixed {
                x: sigma_x,
                z: sigma_z,
            },
            ..Default::default()
        })
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn cell_size_x(&self) -> f64 {
        self.cell_size_x
    }

    pub fn cell_size_z(&self) -> f64 {
        self.cell_size_z
    }

    /// Right edge of the covered area (meters).
    pub fn max_x(&self) -> f64 {
        self.cols as f64 / 2.0 * self.cell_size_x
    }

    /// Left edge of the covered area (meters).
    pub fn min_x(&self) -> f64 {
        -self.max_x()
    }

    /// Far edge of the covered area (meters).
    pub fn max_z(&self) -> f64 {
        self.rows as f64 * self.cell_size_z
    }

    /// Cell at `(row, col)`. Panics when out of range; use
    /// [`SpatialGrid::get`] for checked access.
    pub fn cell(&self, row: u32, col: u32) -> &Cell {
        &self.cells[(row * self.cols + col) as usize]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }
}

impl SpatialGrid for PolarGrid {
    type Index = (u32, u32);
    type Unit = Cell;

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn units(&self) -> &[Cell] {
        &self.cells
    }

    fn units_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    fn flat_index(&self, (row, col): (u32, u32)) -> Option<usize> {
        if row < self.rows && col < self.cols {
            Some((row * self.cols + col) as usize)
        } else {
            None
        }
    }

    fn grid_index(&self, flat: usize) -> (u32, u32) {
        let flat = flat as u32;
        (flat / self.cols, flat % self.cols)
    }

    fn extent(&self, flat: usize) -> Extent {
        let (row, col) = self.grid_index(flat);
        let x0 = self.min_x() + col as f64 * self.cell_size_x;
        let z0 = row as f64 * self.cell_size_z;
        Extent::new(
            Vector3::new(x0, 0.0, z0),
            Vector3::new(x0 + self.cell_size_x, 0.0, z0 + self.cell_size_z),
        )
    }

    fn locate(&self, p: &Vector3<f64>) -> Option<usize> {
        let fx = ((p.x - self.min_x()) / self.cell_size_x).floor();
        let fz = (p.z / self.cell_size_z).floor();
        if !(fx >= 0.0 && fz >= 0.0 && fx < self.cols as f64 && fz < self.rows as f64) {
            return None;
        }
        self.flat_index((fz as u32, fx as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellState;
    use approx::assert_relative_eq;

    #[test]
    fn test_shape_and_bounds() {
        let grid = PolarGrid::with_fixed_radii(10, 8, 0.5, 1.0, 1, 1).unwrap();

        assert_eq!(grid.len(), 80);
        assert_relative_eq!(grid.max_x(), 2.0);
        assert_relative_eq!(grid.min_x(), -2.0);
        assert_relative_eq!(grid.max_z(), 10.0);
        assert!(grid.get((9, 7)).is_some());
        assert!(grid.get((10, 0)).is_none());
        assert!(grid.get((0, 8)).is_none());
    }

    #[test]
    fn test_every_index_maps_to_one_cell() {
        let grid = PolarGrid::with_fixed_radii(5, 7, 1.0, 1.0, 0, 0).unwrap();
        for flat in 0..grid.len() {
            let (row, col) = grid.grid_index(flat);
            assert_eq!(grid.flat_index((row, col)), Some(flat));
            let cell = &grid.cells()[flat];
            assert_eq!((cell.row(), cell.col()), (row, col));
        }
    }

    #[test]
    fn test_locate_matches_extent() {
        let grid = PolarGrid::with_fixed_radii(4, 4, 1.0, 1.0, 1, 1).unwrap();
        let flat = grid.flat_index((1, 2)).unwrap();
        let centre = grid.extent(flat).center();

        assert_relative_eq!(centre, Vector3::new(0.5, 0.0, 1.5));
        assert_eq!(grid.locate(&centre), Some(flat));
        assert_eq!(grid.locate(&Vector3::new(2.0, 0.0, 1.0)), None);
        assert_eq!(grid.locate(&Vector3::new(f64::NAN, 0.0, 1.0)), None);
    }

    #[test]
    fn test_invalid_shape_is_fatal() {
        assert!(PolarGrid::with_fixed_radii(0, 4, 1.0, 1.0, 1, 1).is_err());
        assert!(PolarGrid::with_fixed_radii(4, 4, 0.0, 1.0, 1, 1).is_err());
    }

    #[test]
    fn test_camera_radii_config() {
        let grid = PolarGrid::from_config(&PolarGridConfig {
            rows: 200,
            cols: 4,
            ..Default::default()
        })
        .unwrap();
        assert!(grid.cell(199, 0).sigma_z() > grid.cell(0, 0).sigma_z());
        assert_eq!(grid.cell(0, 0).occupied_prob(), 0.0);
    }
}
