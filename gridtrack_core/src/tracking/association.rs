//! Association of this frame's candidates with the prior obstacle list.
//!
//! Single-hypothesis, greedy and deterministic:
//! 1. Overlap pass. Each prior's voxels are shifted by its predicted motion
//!    and scored against every candidate by
//!    `|shifted ∩ candidate| / min(|shifted|, |candidate|)`. Pairs at or
//!    above `min_overlap_ratio` are taken by score (desc), prior id (asc),
//!    candidate index (asc).
//! 2. Centroid pass. Remaining pairs whose predicted centroid lies within
//!    `max_association_distance` are taken by distance (asc), prior id (asc),
//!    candidate index (asc).

use std::cmp::Ordering;

use nalgebra::Vector3;

use super::obstacle::{sorted_intersection_len, VoxelCluster};
use super::Obstacle;
use crate::config::ObstacleConfig;
use crate::grid::VoxelGrid;

/// Result of associating candidates with prior obstacles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Association {
    /// `(prior index, candidate index)` pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_priors: Vec<usize>,
    pub unmatched_candidates: Vec<usize>,
}

/// Overlap score between a (shifted) prior voxel set and a candidate.
pub fn overlap_score(prior: &[usize], candidate: &[usize]) -> f64 {
    let smaller = prior.len().min(candidate.len());
    if smaller == 0 {
        return 0.0;
    }
    sorted_intersection_len(prior, candidate) as f64 / smaller as f64
}

fn cluster_centroid(cluster: &VoxelCluster, grid: &VoxelGrid) -> Vector3<f64> {
    let sum: Vector3<f64> = cluster.voxels.iter().map(|&i| grid.center(i)).sum();
    sum / cluster.len().max(1) as f64
}

/// Matches candidates to prior obstacles one-to-one.
///
/// `dt` is the time since the priors were last updated.
pub fn associate(
    priors: &[Obstacle],
    candidates: &[VoxelCluster],
    grid: &VoxelGrid,
    dt: f64,
    config: &ObstacleConfig,
) -> Association {
    let mut prior_taken = vec![false; priors.len()];
    let mut cand_taken = vec![false; candidates.len()];
    let mut matches = Vec::new();

    // Overlap pass
    let mut scored: Vec<(f64, usize, usize)> = Vec::new();
    for (pi, prior) in priors.iter().enumerate() {
        let shifted = prior.shifted_voxels(prior.index_shift(dt, grid), grid);
        for (ci, candidate) in candidates.iter().enumerate() {
            let score = overlap_score(&shifted, &candidate.voxels);
            if score > 0.0 && score >= config.min_overlap_ratio {
                scored.push((score, pi, ci));
            }
        }
    }
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(priors[a.1].id.cmp(&priors[b.1].id))
            .then(a.2.cmp(&b.2))
    });
    for (_, pi, ci) in scored {
        if !prior_taken[pi] && !cand_taken[ci] {
            prior_taken[pi] = true;
            cand_taken[ci] = true;
            matches.push((pi, ci));
        }
    }

    // Centroid pass
    let centroids: Vec<Vector3<f64>> = candidates.iter().map(|c| cluster_centroid(c, grid)).collect();
    let mut near: Vec<(f64, usize, usize)> = Vec::new();
    for (pi, prior) in priors.iter().enumerate() {
        if prior_taken[pi] {
            continue;
        }
        let predicted = prior.centroid + prior.velocity * dt;
        for (ci, centroid) in centroids.iter().enumerate() {
            if cand_taken[ci] {
                continue;
            }
            let d = (centroid - predicted).norm();
            if d <= config.max_association_distance {
                near.push((d, pi, ci));
            }
        }
    }
    near.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(priors[a.1].id.cmp(&priors[b.1].id))
            .then(a.2.cmp(&b.2))
    });
    for (_, pi, ci) in near {
        if !prior_taken[pi] && !cand_taken[ci] {
            prior_taken[pi] = true;
            cand_taken[ci] = true;
            matches.push((pi, ci));
        }
    }

    Association {
        matches,
        unmatched_priors: (0..priors.len()).filter(|&i| !prior_taken[i]).collect(),
        unmatched_candidates: (0..candidates.len()).filter(|&i| !cand_taken[i]).collect(),
    }
}
