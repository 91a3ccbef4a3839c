//! Prediction: ego-motion compensation plus constant-velocity advance.

use nalgebra::{Isometry3, Point3};
use rayon::prelude::*;

use crate::grid::{relocate_particles, CellState, RelocationStats, SpatialGrid, VoxelGrid};

/// Moves every particle forward by `dt` seconds.
///
/// `ego_motion` maps the previous sensor frame into the current one
/// (`T_now⁻¹ · T_prev`); positions are transformed and velocities rotated
/// before the advance. Particles that cross a voxel boundary are handed to
/// their new voxel, those that leave the grid are dropped.
pub fn predict(grid: &mut VoxelGrid, dt: f64, ego_motion: Option<&Isometry3<f64>>) -> RelocationStats {
    grid.units_mut().par_iter_mut().for_each(|voxel| {
        for p in voxel.particles_mut().iter_mut() {
            if let Some(motion) = ego_motion {
                p.position = motion.transform_point(&Point3::from(p.position)).coords;
                p.velocity = motion.rotation * p.velocity;
            }
            p.advance(dt);
        }
    });

    relocate_particles(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoxelGridConfig;
    use crate::grid::VoxelIndex;
    use crate::particle::Particle;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn unit_grid() -> VoxelGrid {
        VoxelGrid::new(&VoxelGridConfig {
            dims: [5, 5, 5],
            min: [0.0, 0.0, 0.0],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap()
    }

    fn seed(grid: &mut VoxelGrid, id: u64, position: Vector3<f64>, velocity: Vector3<f64>) -> usize {
        let home = grid.locate(&position).unwrap();
        grid.units_mut()[home]
            .particles_mut()
            .push(Particle::new(id, position, velocity));
        home
    }

    #[test]
    fn test_particle_crosses_into_next_voxel() {
        let mut grid = unit_grid();
        let from = seed(&mut grid, 1, Vector3::new(0.5, 0.5, 0.5), Vector3::new(1.0, 0.0, 0.0));

        let stats = predict(&mut grid, 1.0, None);

        let to = grid.flat_index(VoxelIndex::new(1, 0, 0)).unwrap();
        assert_eq!(stats.moved, 1);
        assert!(grid.units()[from].is_empty());
        assert_eq!(grid.units()[to].particles()[0].id, 1);
        assert_relative_eq!(grid.units()[to].particles()[0].position, Vector3::new(1.5, 0.5, 0.5));
    }

    #[test]
    fn test_particle_leaving_grid_is_dropped() {
        let mut grid = unit_grid();
        seed(&mut grid, 1, Vector3::new(4.5, 0.5, 0.5), Vector3::new(1.0, 0.0, 0.0));
        seed(&mut grid, 2, Vector3::new(2.5, 2.5, 2.5), Vector3::zeros());

        let stats = predict(&mut grid, 1.0, None);

        assert_eq!(stats.escaped, 1);
        assert_eq!(grid.particle_count(), 1);
    }

    #[test]
    fn test_ego_motion_is_applied_before_advance() {
        let mut grid = unit_grid();
        seed(&mut grid, 1, Vector3::new(2.5, 2.5, 2.5), Vector3::new(0.0, 0.0, 1.0));

        // Sensor moved 1 m forward: static world shifts 1 m back
        let motion = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, -1.0),
            UnitQuaternion::identity(),
        );
        predict(&mut grid, 1.0, Some(&motion));

        let idx = grid.flat_index(VoxelIndex::new(2, 2, 2)).unwrap();
        let p = &grid.units()[idx].particles()[0];
        assert_relative_eq!(p.position, Vector3::new(2.5, 2.5, 2.5));
    }

    #[test]
    fn test_ego_rotation_rotates_velocity() {
        let mut grid = VoxelGrid::new(&VoxelGridConfig {
            dims: [5, 5, 5],
            min: [-2.5, -2.5, -2.5],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap();
        seed(&mut grid, 1, Vector3::new(0.1, 0.1, 0.1), Vector3::new(0.0, 0.0, 1.0));
        let motion = Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::FRAC_PI_2),
        );

        predict(&mut grid, 0.0, Some(&motion));

        let particles: Vec<_> = grid.units().iter().flat_map(|v| v.particles()).collect();
        assert_eq!(particles.len(), 1);
        assert_relative_eq!(particles[0].velocity, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(particles[0].position, Vector3::new(0.1, 0.1, -0.1), epsilon = 1e-12);
    }
}
