//! Forecast point cloud: where each reported obstacle will be shortly.

use gridtrack_env::ColoredPoint;

use super::Obstacle;
use crate::grid::VoxelGrid;

const PALETTE: [[u8; 3]; 6] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
];

/// Member voxel centres of every reported obstacle, advanced by
/// `velocity · horizon`. Points are coloured by obstacle id.
pub fn forecast_points(obstacles: &[Obstacle], grid: &VoxelGrid, horizon: f64) -> Vec<ColoredPoint> {
    obstacles
        .iter()
        .filter(|o| o.is_reported())
        .flat_map(|o| {
            let offset = o.velocity * horizon;
            let rgb = PALETTE[o.id as usize % PALETTE.len()];
            o.voxels.iter().map(move |&i| {
                let p = grid.center(i) + offset;
                ColoredPoint::with_color(p.x as f32, p.y as f32, p.z as f32, rgb)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoxelGridConfig;
    use crate::tracking::{ObstacleState, VoxelCluster};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_points_advance_with_velocity() {
        let grid = VoxelGrid::new(&VoxelGridConfig {
            dims: [4, 4, 4],
            min: [0.0, 0.0, 0.0],
            cell_size: [1.0, 1.0, 1.0],
        })
        .unwrap();
        let mut moving = Obstacle::new(0, VoxelCluster::new(vec![0], &grid).unwrap(), &grid);
        moving.state = ObstacleState::Tracked;
        moving.velocity = Vector3::new(0.0, 0.0, 2.0);
        let mut stale = Obstacle::new(1, VoxelCluster::new(vec![5], &grid).unwrap(), &grid);
        stale.state = ObstacleState::Stale;

        let points = forecast_points(&[moving, stale], &grid, 0.5);

        assert_eq!(points.len(), 1);
        assert_relative_eq!(points[0].position(), Vector3::new(0.5, 0.5, 1.5));
    }
}
