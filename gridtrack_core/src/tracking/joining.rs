//! Common-volume joining.
//!
//! Two obstacles whose bounding boxes share more than `max_common_volume` of
//! the smaller box are merged. The lower id survives and takes the union of
//! both voxel sets; the other is absorbed. Merging grows boxes, so the pass
//! repeats until no pair qualifies.

use super::obstacle::{JoinEvent, ObstacleState, VoxelCluster};
use super::Obstacle;
use crate::grid::VoxelGrid;

/// Shared volume over the smaller volume (0 for degenerate boxes).
pub fn common_volume_ratio(a: &Obstacle, b: &Obstacle) -> f64 {
    let smaller = a.extent.volume().min(b.extent.volume());
    if smaller <= 0.0 {
        return 0.0;
    }
    a.extent.intersection_volume(&b.extent) / smaller
}

/// Finds the first qualifying pair in (lower id, higher id) order.
fn next_pair(obstacles: &[Obstacle], max_common_volume: f64) -> Option<(usize, usize, f64)> {
    for i in 0..obstacles.len() {
        for j in (i + 1)..obstacles.len() {
            let ratio = common_volume_ratio(&obstacles[i], &obstacles[j]);
            if ratio > max_common_volume {
                return Some((i, j, ratio));
            }
        }
    }
    None
}

/// Result of a joining pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinOutcome {
    /// One event per absorption, in the order they happened
    pub events: Vec<JoinEvent>,
    /// Swallowed obstacles in the `Absorbed` state, parallel to `events`
    pub absorbed: Vec<Obstacle>,
}

/// Merges overlapping obstacles to a fixed point.
///
/// `obstacles` is left sorted by id.
pub fn join_common_volumes(
    obstacles: &mut Vec<Obstacle>,
    grid: &VoxelGrid,
    max_common_volume: f64,
) -> JoinOutcome {
    obstacles.sort_by_key(|o| o.id);
    let mut outcome = JoinOutcome::default();

    while let Some((i, j, overlap)) = next_pair(obstacles, max_common_volume) {
        let mut absorbed = obstacles.remove(j);
        let survivor = &mut obstacles[i];

        let mut voxels = std::mem::take(&mut survivor.voxels);
        voxels.extend(absorbed.voxels.iter().copied());
        if let Some(cluster) = VoxelCluster::new(voxels, grid) {
            survivor.set_cluster(cluster, grid);
        }
        survivor.hits = survivor.hits.max(absorbed.hits);
        absorbed.state = ObstacleState::Absorbed;

        outcome.events.push(JoinEvent {
            survivor: survivor.id,
            absorbed: absorbed.id,
            overlap,
        });
        outcome.absorbed.push(absorbed);
    }
    outcome
}
