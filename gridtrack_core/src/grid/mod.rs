//! Spatial discretisation shared by the 2-D polar grid and the 3-D voxel grid.
//!
//! Both variants own a dense, row-major array of units (cells or voxels).
//! [`SpatialGrid`] exposes flat-index access plus the geometry needed to
//! map continuous positions back to units, and is the seam through which
//! particle maintenance works for either variant.
//!
//! Particle membership across units changes only through
//! [`SpatialGrid::move_particle`].

mod cell;
mod polar;
mod voxel;
mod voxel_grid;

pub use cell::Cell;
pub use polar::PolarGrid;
pub use voxel::{Voxel, VoxelIndex};
pub use voxel_grid::VoxelGrid;

use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::particle::{Particle, ParticleId};

// ============================================================================
// EXTENT
// ============================================================================

/// An axis-aligned box in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Extent {
    /// Creates an extent, normalising corners so that `min <= max` per axis.
    pub fn new(a: Vector3<f64>, b: Vector3<f64>) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn volume(&self) -> f64 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Volume shared with `other` (0 when disjoint).
    pub fn intersection_volume(&self, other: &Extent) -> f64 {
        let lo = self.min.sup(&other.min);
        let hi = self.max.inf(&other.max);
        let d = hi - lo;
        if d.x <= 0.0 || d.y <= 0.0 || d.z <= 0.0 {
            0.0
        } else {
            d.x * d.y * d.z
        }
    }

    /// Smallest extent covering both.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> Extent {
        Extent {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

// ============================================================================
// GRID ABSTRACTION
// ============================================================================

/// State every grid unit carries: occupancy and an owned particle set.
pub trait CellState {
    fn occupied_prob(&self) -> f64;

    fn set_occupied_prob(&mut self, prob: f64);

    fn particles(&self) -> &[Particle];

    fn particles_mut(&mut self) -> &mut Vec<Particle>;

    fn is_empty(&self) -> bool {
        self.particles().is_empty()
    }
}

/// A dense, fixed-shape spatial grid.
pub trait SpatialGrid {
    /// Multi-dimensional index type ((row, col) or [`VoxelIndex`]).
    type Index: Copy + Eq + std::fmt::Debug;

    /// The unit stored at each index.
    type Unit: CellState + Send + Sync;

    /// Total number of units.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn units(&self) -> &[Self::Unit];

    fn units_mut(&mut self) -> &mut [Self::Unit];

    /// Bounds-checked conversion to a flat index.
    fn flat_index(&self, index: Self::Index) -> Option<usize>;

    /// Inverse of [`flat_index`](Self::flat_index). `flat` must be `< len()`.
    fn grid_index(&self, flat: usize) -> Self::Index;

    /// Physical extent of the unit at `flat`.
    fn extent(&self, flat: usize) -> Extent;

    /// Flat index of the unit containing `p` (half-open bounds), if any.
    fn locate(&self, p: &Vector3<f64>) -> Option<usize>;

    fn get(&self, index: Self::Index) -> Option<&Self::Unit> {
        self.flat_index(index).map(|i| &self.units()[i])
    }

    fn get_mut(&mut self, index: Self::Index) -> Option<&mut Self::Unit> {
        let i = self.flat_index(index)?;
        Some(&mut self.units_mut()[i])
    }

    /// Total particles across all units.
    fn particle_count(&self) -> usize {
        self.units().iter().map(|u| u.particles().len()).sum()
    }

    /// Transfers particle `id` from unit `from` to unit `to`.
    ///
    /// The particle leaves `from` and enters `to` in one step; it is never
    /// duplicated nor lost.
    fn move_particle(&mut self, id: ParticleId, from: usize, to: usize) -> Result<(), GridError> {
        let len = self.len();
        for index in [from, to] {
            if index >= len {
                return Err(GridError::IndexOutOfBounds { index, len });
            }
        }
        if from == to {
            return if self.units()[from].particles().iter().any(|p| p.id == id) {
                Ok(())
            } else {
                Err(GridError::ParticleNotFound(id))
            };
        }

        let units = self.units_mut();
        let source = units[from].particles_mut();
        let pos = source
            .iter()
            .position(|p| p.id == id)
            .ok_or(GridError::ParticleNotFound(id))?;
        let particle = source.swap_remove(pos);
        units[to].particles_mut().push(particle);
        Ok(())
    }
}

// ============================================================================
// MAINTENANCE
// ============================================================================

/// Outcome of a relocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationStats {
    /// Particles transferred to a different unit
    pub moved: usize,
    /// Particles that left the grid and were dropped
    pub escaped: usize,
}

/// Re-homes every particle whose position left its owning unit.
///
/// Transfers are collected first and applied afterwards, so each particle
/// moves at most once per pass.
pub fn relocate_particles<G: SpatialGrid>(grid: &mut G) -> RelocationStats {
    let mut transfers: Vec<(ParticleId, usize, Option<usize>)> = Vec::new();
    for (i, unit) in grid.units().iter().enumerate() {
        for p in unit.particles() {
            let target = grid.locate(&p.position);
            if target != Some(i) {
                transfers.push((p.id, i, target));
            }
        }
    }

    let mut stats = RelocationStats::default();
    for (id, from, to) in transfers {
        match to {
            Some(to) => {
                if grid.move_particle(id, from, to).is_ok() {
                    stats.moved += 1;
                }
            }
            None => {
                grid.units_mut()[from].particles_mut().retain(|p| p.id != id);
                stats.escaped += 1;
            }
        }
    }
    stats
}

/// Drops particles whose position lies outside the grid entirely.
///
/// Returns the number of particles removed.
pub fn remove_escaped_particles<G: SpatialGrid>(grid: &mut G) -> usize {
    let mut escaped: Vec<(usize, ParticleId)> = Vec::new();
    for (i, unit) in grid.units().iter().enumerate() {
        for p in unit.particles() {
            if grid.locate(&p.position).is_none() {
                escaped.push((i, p.id));
            }
        }
    }

    for &(i, id) in &escaped {
        grid.units_mut()[i].particles_mut().retain(|p| p.id != id);
    }
    escaped.len()
}

/// Culls every unit down to `cap` particles, keeping the oldest
/// (ties: lowest id). Returns the number removed.
pub fn enforce_particle_cap<G: SpatialGrid>(grid: &mut G, cap: usize) -> usize {
    grid.units_mut()
        .par_iter_mut()
        .map(|unit| {
            let particles = unit.particles_mut();
            if particles.len() <= cap {
                return 0;
            }
            particles.sort_by(|a, b| b.age.cmp(&a.age).then(a.id.cmp(&b.id)));
            let removed = particles.len() - cap;
            particles.truncate(cap);
            removed
        })
        .sum()
}
