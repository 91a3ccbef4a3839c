//! Velocity summaries: per-voxel main vectors and per-obstacle speed.

use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::Vector3;
use rayon::prelude::*;

use super::Obstacle;
use crate::config::{ObstacleSpeedSource, SegmentationConfig, SpeedMethod};
use crate::grid::{CellState, VoxelGrid};
use crate::particle::{velocity_pitch, velocity_yaw, Particle};

// ============================================================================
// MAIN VECTORS
// ============================================================================

/// Mean velocity of a particle set; `None` when empty.
pub fn mean_velocity(particles: &[Particle]) -> Option<Vector3<f64>> {
    if particles.is_empty() {
        return None;
    }
    let sum: Vector3<f64> = particles.iter().map(|p| p.velocity).sum();
    Some(sum / particles.len() as f64)
}

/// Mean velocity of the most populated yaw/pitch bin (ties: lowest bin).
pub fn histogram_velocity(
    particles: &[Particle],
    yaw_interval: f64,
    pitch_interval: f64,
) -> Option<Vector3<f64>> {
    let mut bins: BTreeMap<(i64, i64), (usize, Vector3<f64>)> = BTreeMap::new();
    for p in particles {
        let yaw_bin = ((p.yaw() + PI) / yaw_interval).floor() as i64;
        let pitch_bin = ((p.pitch() + FRAC_PI_2) / pitch_interval).floor() as i64;
        let entry = bins.entry((yaw_bin, pitch_bin)).or_insert((0, Vector3::zeros()));
        entry.0 += 1;
        entry.1 += p.velocity;
    }

    let mut best: Option<(usize, Vector3<f64>)> = None;
    for &(count, sum) in bins.values() {
        if best.map_or(true, |(c, _)| count > c) {
            best = Some((count, sum));
        }
    }
    best.map(|(count, sum)| sum / count as f64)
}

/// Recomputes every voxel's main vector from its particles.
pub fn compute_main_vectors(grid: &mut VoxelGrid, config: &SegmentationConfig) {
    grid.voxels_mut().par_iter_mut().for_each(|voxel| {
        let v = match config.speed_method {
            SpeedMethod::Mean => mean_velocity(voxel.particles()),
            SpeedMethod::Histogram => histogram_velocity(
                voxel.particles(),
                config.yaw_interval,
                config.pitch_interval,
            ),
        };
        voxel.set_main_vector(v);
    });
}

/// Absolute difference between two angles, wrapped to `[0, π]`.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    if d > PI {
        TAU - d
    } else {
        d
    }
}

/// Whether two velocities agree in yaw, pitch and magnitude.
pub fn is_coherent(a: &Vector3<f64>, b: &Vector3<f64>, config: &SegmentationConfig) -> bool {
    angle_diff(velocity_yaw(a), velocity_yaw(b)) <= config.thresh_yaw
        && angle_diff(velocity_pitch(a), velocity_pitch(b)) <= config.thresh_pitch
        && (a.norm() - b.norm()).abs() <= config.thresh_magnitude
}

// ============================================================================
// OBSTACLE SPEED
// ============================================================================

/// Velocity of an obstacle from its member voxels.
///
/// `PerVoxel` weights each member's main vector by its occupancy
/// probability (plain mean when all weights are zero). `PerObstacle` averages
/// every member particle. Obstacles with no velocity evidence get zero.
pub fn obstacle_velocity(
    voxels: &[usize],
    grid: &VoxelGrid,
    source: ObstacleSpeedSource,
) -> Vector3<f64> {
    let members = voxels.iter().map(|&i| &grid.voxels()[i]);
    match source {
        ObstacleSpeedSource::PerVoxel => {
            let mut weighted = Vector3::zeros();
            let mut weight = 0.0;
            let mut plain = Vector3::zeros();
            let mut n = 0usize;
            for voxel in members {
                if let Some(v) = voxel.main_vector() {
                    weighted += v * voxel.occupied_prob();
                    weight += voxel.occupied_prob();
                    plain += v;
                    n += 1;
                }
            }
            if weight > 0.0 {
                weighted / weight
            } else if n > 0 {
                plain / n as f64
            } else {
                Vector3::zeros()
            }
        }
        ObstacleSpeedSource::PerObstacle => {
            let mut sum = Vector3::zeros();
            let mut n = 0usize;
            for voxel in members {
                for p in voxel.particles() {
                    sum += p.velocity;
                    n += 1;
                }
            }
            if n > 0 {
                sum / n as f64
            } else {
                Vector3::zeros()
            }
        }
    }
}

/// Updates the velocity of every obstacle from the grid.
pub fn update_obstacle_speeds(obstacles: &mut [Obstacle], grid: &VoxelGrid, source: ObstacleSpeedSource) {
    obstacles.par_iter_mut().for_each(|o| {
        o.velocity = obstacle_velocity(&o.voxels, grid, source);
    });
}

/// Writes each obstacle's velocity back into its member particles.
///
/// Returns the number of particles updated.
pub fn feed_back_speeds(obstacles: &[Obstacle], grid: &mut VoxelGrid) -> usize {
    let mut updated = 0;
    for o in obstacles {
        for &i in &o.voxels {
            let voxel = &mut grid.voxels_mut()[i];
            for p in voxel.particles_mut().iter_mut() {
                p.velocity = o.velocity;
                updated += 1;
            }
            voxel.set_main_vector(Some(o.velocity));
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoxelGridConfig;
    use crate::grid::SpatialGrid;
    use approx::assert_relative_eq;

    fn p(id: u64, vx: f64, vz: f64) -> Particle {
        Particle::new(id, Vector3::zeros(), Vector3::new(vx, 0.0, vz))
    }

    #[test]
    fn test_mean_velocity() {
        let particles = [p(0, 1.0, 0.0), p(1, 0.0, 1.0)];
        assert_relative_eq!(mean_velocity(&particles).unwrap(), Vector3::new(0.5, 0.0, 0.5));
        assert!(mean_velocity(&[]).is_none());
    }

    #[test]
    fn test_histogram_picks_dominant_direction() {
        // Three moving forward, two moving right
        let particles = [
            p(0, 0.0, 1.0),
            p(1, 0.0, 1.2),
            p(2, 0.0, 0.8),
            p(3, 1.0, 0.0),
            p(4, 1.0, 0.0),
        ];
        let v = histogram_velocity(&particles, PI / 8.0, PI / 8.0).unwrap();
        assert_relative_eq!(v, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_histogram_tie_goes_to_lowest_bin() {
        let particles = [p(0, -1.0, 0.0), p(1, 1.0, 0.0)];
        let v = histogram_velocity(&particles, PI / 8.0, PI / 8.0).unwrap();
        // yaw -π/2 sorts first
        assert_relative_eq!(v, Vector3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_angle_wraps() {
        assert_relative_eq!(angle_diff(PI - 0.1, -PI + 0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(angle_diff(0.0, PI), PI);
    }

    #[test]
    fn test_coherence_thresholds() {
        let config = SegmentationConfig::default();
        let a = Vector3::new(0.0, 0.0, 1.0);
        let b = Vector3::new(0.1, 0.0, 1.0);
        let c = Vector3::new(1.0, 0.0, 0.0);
        let d = Vector3::new(0.0, 0.0, 3.0);

        assert!(is_coherent(&a, &b, &config));
        assert!(!is_coherent(&a, &c, &config));
        assert!(!is_coherent(&a, &d, &config));
    }

    #[test]
    fn test_obstacle_speed_sources() {
        let mut grid = VoxelGrid::new(&VoxelGridConfig {
            dims: [2, 1, 1],
            min: [0.0, 0.0, 0.0],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap();
        {
            let voxels = grid.units_mut();
            voxels[0].particles_mut().push(p(0, 1.0, 0.0));
            voxels[0].set_occupied_prob(0.75);
            voxels[1].particles_mut().extend([p(1, 0.0, 1.0), p(2, 0.0, 1.0), p(3, 0.0, 1.0)]);
            voxels[1].set_occupied_prob(0.25);
        }
        compute_main_vectors(&mut grid, &SegmentationConfig::default());

        let per_voxel = obstacle_velocity(&[0, 1], &grid, ObstacleSpeedSource::PerVoxel);
        let per_obstacle = obstacle_velocity(&[0, 1], &grid, ObstacleSpeedSource::PerObstacle);

        assert_relative_eq!(per_voxel, Vector3::new(0.75, 0.0, 0.25));
        assert_relative_eq!(per_obstacle, Vector3::new(0.25, 0.0, 0.75));
    }
}
