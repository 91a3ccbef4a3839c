//! Obstacle filtering: density, size and height constraints.

use super::Obstacle;
use crate::config::ObstacleConfig;

/// Whether an obstacle's current shape passes every filter.
pub fn passes_filters(obstacle: &Obstacle, config: &ObstacleConfig) -> bool {
    let height = obstacle.height();
    obstacle.voxels.len() >= config.min_voxels_per_obstacle
        && obstacle.density >= config.min_obstacle_density
        && height >= config.min_obstacle_height
        && height <= config.max_obstacle_height
}
