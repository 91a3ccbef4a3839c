//! A single voxel of the 3-D grid.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::CellState;
use crate::particle::Particle;
use crate::tracking::ObstacleId;

/// Integer coordinates of a voxel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelIndex {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl VoxelIndex {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Offsets the index, returning `None` on underflow.
    pub fn offset(&self, dx: i64, dy: i64, dz: i64) -> Option<VoxelIndex> {
        let x = u32::try_from(self.x as i64 + dx).ok()?;
        let y = u32::try_from(self.y as i64 + dy).ok()?;
        let z = u32::try_from(self.z as i64 + dz).ok()?;
        Some(VoxelIndex { x, y, z })
    }
}

/// One voxel: occupancy, raw evidence, obstacle membership and particles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Voxel {
    index: VoxelIndex,
    occupied_prob: f64,
    point_count: u32,
    obstacle: Option<ObstacleId>,
    main_vector: Option<Vector3<f64>>,
    particles: Vec<Particle>,
}

impl Voxel {
    pub fn new(index: VoxelIndex) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    #[inline]
    pub fn index(&self) -> VoxelIndex {
        self.index
    }

    /// Sensor points that fell into this voxel in the latest frame.
    #[inline]
    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn set_point_count(&mut self, count: u32) {
        self.point_count = count;
    }

    /// Obstacle this voxel currently belongs to, if any.
    #[inline]
    pub fn obstacle(&self) -> Option<ObstacleId> {
        self.obstacle
    }

    pub fn set_obstacle(&mut self, obstacle: Option<ObstacleId>) {
        self.obstacle = obstacle;
    }

    /// Dominant particle velocity, once computed for this frame.
    #[inline]
    pub fn main_vector(&self) -> Option<Vector3<f64>> {
        self.main_vector
    }

    pub fn set_main_vector(&mut self, v: Option<Vector3<f64>>) {
        self.main_vector = v;
    }

    /// Clears all per-frame and particle state, keeping the index.
    pub fn reset(&mut self) {
        *self = Self::new(self.index);
    }
}

impl CellState for Voxel {
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
