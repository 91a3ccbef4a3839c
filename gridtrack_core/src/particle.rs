//! Particles: hypothesised dynamic points owned by a single cell or voxel.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::grid::Extent;

/// Unique particle identifier.
pub type ParticleId = u64;

/// One hypothesised dynamic point.
///
/// Positions and velocities are in the grid's sensor frame (meters, m/s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: ParticleId,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Frames survived since spawning
    pub age: u32,
}

impl Particle {
    /// Creates a fresh (age 0) particle.
    pub fn new(id: ParticleId, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            id,
            position,
            velocity,
            age: 0,
        }
    }

    /// Constant-velocity motion over `dt` seconds.
    #[inline]
    pub fn advance(&mut self, dt: f64) {
        self.position += self.velocity * dt;
    }

    /// Heading in the ground (x/z) plane, radians.
    #[inline]
    pub fn yaw(&self) -> f64 {
        velocity_yaw(&self.velocity)
    }

    /// Elevation above the ground plane, radians.
    #[inline]
    pub fn pitch(&self) -> f64 {
        velocity_pitch(&self.velocity)
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }
}

/// Heading of a velocity vector in the x/z plane.
pub fn velocity_yaw(v: &Vector3<f64>) -> f64 {
    v.x.atan2(v.z)
}

/// Elevation of a velocity vector (y is down, so upward motion is positive).
pub fn velocity_pitch(v: &Vector3<f64>) -> f64 {
    (-v.y).atan2((v.x * v.x + v.z * v.z).sqrt())
}

/// Thread-safe allocator of unique particle ids.
///
/// Shared by parallel spawning workers; each call reserves a contiguous block.
#[derive(Debug, Default)]
pub struct ParticleIdAllocator {
    next: AtomicU64,
}

impl ParticleIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `n` consecutive ids.
    pub fn reserve(&self, n: usize) -> Range<ParticleId> {
        let start = self.next.fetch_add(n as u64, Ordering::Relaxed);
        start..start + n as u64
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}

/// Samples one particle per id uniformly inside `extent`, with velocities
/// uniform in `[-max_velocity, max_velocity]` per axis.
pub fn spawn_uniform<R: Rng + ?Sized>(
    extent: &Extent,
    ids: Range<ParticleId>,
    max_velocity: &Vector3<f64>,
    rng: &mut R,
) -> Vec<Particle> {
    ids.map(|id| {
        let position = Vector3::new(
            sample_axis(rng, extent.min.x, extent.max.x),
            sample_axis(rng, extent.min.y, extent.max.y),
            sample_axis(rng, extent.min.z, extent.max.z),
        );
        let velocity = Vector3::new(
            rng.gen_range(-max_velocity.x..=max_velocity.x),
            rng.gen_range(-max_velocity.y..=max_velocity.y),
            rng.gen_range(-max_velocity.z..=max_velocity.z),
        );
        Particle::new(id, position, velocity)
    })
    .collect()
}

/// Half-open sample in `[lo, hi)`; degenerate axes collapse to `lo`.
fn sample_axis<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_advance_constant_velocity() {
        let mut p = Particle::new(0, Vector3::new(1.0, 0.0, 2.0), Vector3::new(0.5, 0.0, -1.0));
        p.advance(2.0);
        assert_relative_eq!(p.position, Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_yaw_pitch_conventions() {
        let forward = Particle::new(0, Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        let right = Particle::new(1, Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let up = Particle::new(2, Vector3::zeros(), Vector3::new(0.0, -1.0, 0.0));

        assert_relative_eq!(forward.yaw(), 0.0);
        assert_relative_eq!(right.yaw(), std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(up.pitch(), std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn test_id_allocator_blocks_are_disjoint() {
        let ids = ParticleIdAllocator::new();
        let a = ids.reserve(4);
        let b = ids.reserve(3);
        assert_eq!(a, 0..4);
        assert_eq!(b, 4..7);
        assert_eq!(ids.issued(), 7);
    }

    #[test]
    fn test_spawn_stays_inside_extent() {
        let extent = Extent::new(Vector3::new(1.0, 0.0, 2.0), Vector3::new(2.0, 0.0, 3.0));
        let ids = ParticleIdAllocator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let max_velocity = Vector3::new(1.0, 0.0, 1.0);

        let particles = spawn_uniform(&extent, ids.reserve(50), &max_velocity, &mut rng);

        assert_eq!(particles.len(), 50);
        assert_eq!(particles[49].id, 49);
        for p in &particles {
            assert!(extent.contains(&p.position));
            assert_eq!(p.position.y, 0.0);
            assert!(p.velocity.x.abs() <= 1.0);
            assert_eq!(p.velocity.y, 0.0);
        }
    }

    #[test]
    fn test_spawn_at_speed_bound() {
        let extent = Extent::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0));
        let ids = ParticleIdAllocator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let bound = crate::config::MAX_PARTICLE_SPEED;

        let particles = spawn_uniform(&extent, ids.reserve(20), &Vector3::repeat(bound), &mut rng);

        assert_eq!(particles.len(), 20);
        assert!(particles.iter().all(|p| p.velocity.amax() <= bound));
    }
}
