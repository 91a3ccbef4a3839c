//! A single polar-grid cell.

use serde::{Deserialize, Serialize};

use super::CellState;
use crate::camera::CameraParams;
use crate::particle::Particle;

/// One (row, col) cell of the polar grid.
///
/// Rows index depth (z), columns index lateral position (x). The smoothing
/// radii are fixed at construction; occupancy and particles change per frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    row: u32,
    col: u32,
    sigma_x: u32,
    sigma_z: u32,
    occupied_prob: f64,
    particles: Vec<Particle>,
}

impl Cell {
    /// Creates a cell with explicit smoothing radii.
    pub fn new(row: u32, col: u32, sigma_x: u32, sigma_z: u32) -> Self {
        Self {
            row,
            col,
            sigma_x,
            sigma_z,
            occupied_prob: 0.0,
            particles: Vec::new(),
        }
    }

    /// Creates a cell whose radii cover the stereo uncertainty at its depth.
    ///
    /// Farther rows get larger windows.
    pub fn from_camera(
        row: u32,
        col: u32,
        cell_size_x: f64,
        cell_size_z: f64,
        camera: &CameraParams,
    ) -> Self {
        let depth = (row as f64 + 0.5) * cell_size_z;
        let sigma_x = (camera.lateral_sigma(depth) / cell_size_x).round() as u32;
        let sigma_z = (camera.depth_sigma(depth) / cell_size_z).round() as u32;
        Self::new(row, col, sigma_x, sigma_z)
    }

    #[inline]
    pub fn row(&self) -> u32 {
        self.row
    }

    #[inline]
    pub fn col(&self) -> u32 {
        self.col
    }

    /// Lateral smoothing radius, in cells.
    #[inline]
    pub fn sigma_x(&self) -> u32 {
        self.sigma_x
    }

    /// Depth smoothing radius, in cells.
    #[inline]
    pub fn sigma_z(&self) -> u32 {
        self.sigma_z
    }
}

impl CellState for Cell {
    fn occupied_prob(&self) -> f64 {
        self.occupied_prob
    }

    fn set_occupied_prob(&mut self, prob: f64) {
        self.occupied_prob = prob;
    }

    fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn particles_mut(&mut self) -> &mut Vec<Particle> {
        &mut self.particles
    }
}
