//! Obstacles: identity-persistent clusters of voxels.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::ObstacleId;
use crate::grid::{CellState, Extent, SpatialGrid, VoxelGrid, VoxelIndex};

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Where an obstacle is in its life.
///
/// `Confirmed → Tracked ⇄ Stale → Removed`, or `Absorbed` when another
/// obstacle swallows it during common-volume joining. Before filtering a
/// detection is only a [`VoxelCluster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleState {
    /// Passed noise removal and filtering on its first frame
    Confirmed,
    /// Matched to a prior obstacle this frame
    Tracked,
    /// Unmatched or filtered out; coasting on its last velocity
    Stale,
    Removed,
    Absorbed,
}

impl ObstacleState {
    /// Whether obstacles in this state are handed to callers.
    pub fn is_reported(self) -> bool {
        matches!(self, ObstacleState::Confirmed | ObstacleState::Tracked)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ObstacleState::Removed | ObstacleState::Absorbed)
    }
}

// ============================================================================
// CANDIDATE
// ============================================================================

/// A set of voxels that may become (or continue) an obstacle.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelCluster {
    /// Sorted, deduplicated flat voxel indices
    pub voxels: Vec<usize>,
    /// Inclusive index-space bounding box
    pub index_min: VoxelIndex,
    pub index_max: VoxelIndex,
}

impl VoxelCluster {
    /// Builds a cluster; returns `None` for an empty voxel set.
    pub fn new(mut voxels: Vec<usize>, grid: &VoxelGrid) -> Option<Self> {
        voxels.sort_unstable();
        voxels.dedup();
        let (&first, rest) = voxels.split_first()?;

        let mut lo = grid.grid_index(first);
        let mut hi = lo;
        for &flat in rest {
            let idx = grid.grid_index(flat);
            lo = VoxelIndex::new(lo.x.min(idx.x), lo.y.min(idx.y), lo.z.min(idx.z));
            hi = VoxelIndex::new(hi.x.max(idx.x), hi.y.max(idx.y), hi.z.max(idx.z));
        }

        Some(Self {
            voxels,
            index_min: lo,
            index_max: hi,
        })
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Number of voxels in the bounding box.
    pub fn box_volume(&self) -> usize {
        let (lo, hi) = (self.index_min, self.index_max);
        (hi.x - lo.x + 1) as usize * (hi.y - lo.y + 1) as usize * (hi.z - lo.z + 1) as usize
    }

    /// Members / bounding-box voxels.
    pub fn density(&self) -> f64 {
        self.len() as f64 / self.box_volume() as f64
    }

    /// Mean occupancy probability of the member voxels.
    pub fn mean_occupancy(&self, grid: &VoxelGrid) -> f64 {
        if self.voxels.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .voxels
            .iter()
            .map(|&i| grid.voxels()[i].occupied_prob())
            .sum();
        total / self.voxels.len() as f64
    }

    /// Whether the two index boxes touch after growing one by `margin`.
    pub fn boxes_touch(&self, other: &VoxelCluster, margin: u32) -> bool {
        let near = |a_lo: u32, a_hi: u32, b_lo: u32, b_hi: u32| {
            a_lo <= b_hi.saturating_add(margin) && b_lo <= a_hi.saturating_add(margin)
        };
        near(self.index_min.x, self.index_max.x, other.index_min.x, other.index_max.x)
            && near(self.index_min.y, self.index_max.y, other.index_min.y, other.index_max.y)
            && near(self.index_min.z, self.index_max.z, other.index_min.z, other.index_max.z)
    }
}

// ============================================================================
// OBSTACLE
// ============================================================================

/// A tracked obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub state: ObstacleState,

    /// Sorted flat indices of member voxels
    pub voxels: Vec<usize>,

    /// Inclusive index-space bounding box
    pub index_min: VoxelIndex,
    pub index_max: VoxelIndex,

    /// Physical bounding box (sensor frame, meters)
    pub extent: Extent,

    /// Mean of member voxel centres
    pub centroid: Vector3<f64>,

    /// Members / bounding-box voxels
    pub density: f64,

    /// Estimated velocity (m/s)
    pub velocity: Vector3<f64>,

    /// Frames this obstacle has been matched, including its first
    pub hits: u32,

    /// Consecutive frames without a match
    pub missed_frames: u32,
}

impl Obstacle {
    /// Creates a fresh obstacle in the `Confirmed` state.
    pub fn new(id: ObstacleId, cluster: VoxelCluster, grid: &VoxelGrid) -> Self {
        let mut obstacle = Self {
            id,
            state: ObstacleState::Confirmed,
            voxels: Vec::new(),
            index_min: VoxelIndex::default(),
            index_max: VoxelIndex::default(),
            extent: Extent::new(Vector3::zeros(), Vector3::zeros()),
            centroid: Vector3::zeros(),
            density: 0.0,
            velocity: Vector3::zeros(),
            hits: 1,
            missed_frames: 0,
        };
        obstacle.set_cluster(cluster, grid);
        obstacle
    }

    /// Replaces the member voxels and recomputes the shape summary.
    pub fn set_cluster(&mut self, cluster: VoxelCluster, grid: &VoxelGrid) {
        self.density = cluster.density();
        self.extent = grid.extent_of_box(cluster.index_min, cluster.index_max);
        self.index_min = cluster.index_min;
        self.index_max = cluster.index_max;
        self.centroid = if cluster.voxels.is_empty() {
            self.extent.center()
        } else {
            cluster
                .voxels
                .iter()
                .map(|&i| grid.center(i))
                .sum::<Vector3<f64>>()
                / cluster.voxels.len() as f64
        };
        self.voxels = cluster.voxels;
    }

    /// Member voxels as a cluster.
    pub fn cluster(&self) -> VoxelCluster {
        VoxelCluster {
            voxels: self.voxels.clone(),
            index_min: self.index_min,
            index_max: self.index_max,
        }
    }

    /// Physical extent along y (meters).
    pub fn height(&self) -> f64 {
        self.extent.size().y
    }

    pub fn is_reported(&self) -> bool {
        self.state.is_reported()
    }

    /// Voxel-index shift matching a displacement of `velocity · dt`.
    pub fn index_shift(&self, dt: f64, grid: &VoxelGrid) -> [i64; 3] {
        let d = (self.velocity * dt).component_div(&grid.cell_size());
        [d.x.round() as i64, d.y.round() as i64, d.z.round() as i64]
    }

    /// Member voxels shifted by `shift`; voxels leaving the grid are dropped.
    pub fn shifted_voxels(&self, shift: [i64; 3], grid: &VoxelGrid) -> Vec<usize> {
        if shift == [0, 0, 0] {
            return self.voxels.clone();
        }
        let mut out: Vec<usize> = self
            .voxels
            .iter()
            .filter_map(|&i| {
                grid.grid_index(i)
                    .offset(shift[0], shift[1], shift[2])
                    .and_then(|idx| grid.flat_index(idx))
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Advances an unmatched obstacle along its velocity for `dt` seconds.
    pub fn coast(&mut self, dt: f64, grid: &VoxelGrid) {
        let shift = self.index_shift(dt, grid);
        let voxels = self.shifted_voxels(shift, grid);
        match VoxelCluster::new(voxels, grid) {
            Some(cluster) => self.set_cluster(cluster, grid),
            None => {
                let offset = self.velocity * dt;
                self.extent = self.extent.translated(&offset);
                self.centroid += offset;
                self.voxels.clear();
            }
        }
    }

    /// Re-expresses the obstacle in the current sensor frame.
    ///
    /// `motion` maps previous-frame coordinates into current ones. Member
    /// voxel centres are moved and re-voxelised; the velocity is rotated.
    pub fn apply_ego_motion(&mut self, motion: &Isometry3<f64>, grid: &VoxelGrid) {
        self.velocity = motion.rotation * self.velocity;

        let voxels: Vec<usize> = self
            .voxels
            .iter()
            .filter_map(|&i| grid.locate(&(motion * Point3::from(grid.center(i))).coords))
            .collect();
        match VoxelCluster::new(voxels, grid) {
            Some(cluster) => self.set_cluster(cluster, grid),
            None => {
                let corners = [self.extent.min, self.extent.max];
                let mut lo = Vector3::repeat(f64::INFINITY);
                let mut hi = Vector3::repeat(f64::NEG_INFINITY);
                for &x in &[corners[0].x, corners[1].x] {
                    for &y in &[corners[0].y, corners[1].y] {
                        for &z in &[corners[0].z, corners[1].z] {
                            let p = (motion * Point3::new(x, y, z)).coords;
                            lo = lo.inf(&p);
                            hi = hi.sup(&p);
                        }
                    }
                }
                self.extent = Extent::new(lo, hi);
                self.centroid = (motion * Point3::from(self.centroid)).coords;
                self.voxels.clear();
            }
        }
    }
}

/// Record of one obstacle swallowing another during common-volume joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinEvent {
    pub survivor: ObstacleId,
    pub absorbed: ObstacleId,
    /// Shared volume over the smaller volume at the time of joining
    pub overlap: f64,
}

/// Number of elements common to two sorted slices.
pub(crate) fn sorted_intersection_len(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut n) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}
