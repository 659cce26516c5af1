// Cosine k-means for splitting leftover noise into a few groups.
//
// Deterministic for a fixed seed. Assignment ties go to the lower centre index.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::vector::{centroid, cosine_similarity, normalize};

/// k-means settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansConfig {
    pub seed: u64,
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iterations: 100,
        }
    }
}

/// Partition the points at `indices` into at most `k` non-empty groups.
///
/// Returned groups hold indices from `indices`, each group in ascending order.
/// Empty groups are dropped, so fewer than `k` groups may come back (e.g. when
/// points are identical).
pub fn kmeans(
    vectors: &[Vec<f64>],
    indices: &[usize],
    k: usize,
    config: &KMeansConfig,
) -> Vec<Vec<usize>> {
    let m = indices.len();
    let k = k.min(m);
    if k <= 1 {
        return if m == 0 {
            Vec::new()
        } else {
            vec![indices.to_vec()]
        };
    }

    let mut centres = initial_centres(vectors, indices, k, config.seed);
    let mut assignment = vec![usize::MAX; m];

    for iteration in 0..config.max_iterations.max(1) {
        let mut changed = false;
        for (pos, &point) in indices.iter().enumerate() {
            let nearest = nearest_centre(&vectors[point], &centres);
            if assignment[pos] != nearest {
                assignment[pos] = nearest;
                changed = true;
            }
        }

        if !changed {
            tracing::debug!(iteration, k, "k-means converged");
            break;
        }

        for (c, centre) in centres.iter_mut().enumerate() {
            let members: Vec<usize> = indices
                .iter()
                .zip(assignment.iter())
                .filter(|(_, &a)| a == c)
                .map(|(&i, _)| i)
                .collect();
            if !members.is_empty() {
                *centre = centroid(vectors, &members);
            }
        }
    }

    let mut groups = vec![Vec::new(); k];
    for (&point, &a) in indices.iter().zip(assignment.iter()) {
        groups[a].push(point);
    }
    groups.retain(|g| !g.is_empty());
    for group in &mut groups {
        group.sort_unstable();
    }
    groups
}

/// First centre is drawn at random; each following centre is the point least
/// similar to every centre chosen so far (ties go to the earlier point).
fn initial_centres(vectors: &[Vec<f64>], indices: &[usize], k: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let first = rng.random_range(0..indices.len());
    let mut centres = vec![normalize(&vectors[indices[first]])];

    while centres.len() < k {
        let mut pick = 0;
        let mut lowest = f64::INFINITY;
        for (pos, &point) in indices.iter().enumerate() {
            let closest = centres
                .iter()
                .map(|c| cosine_similarity(&vectors[point], c))
                .fold(f64::NEG_INFINITY, f64::max);
            if closest < lowest {
                lowest = closest;
                pick = pos;
            }
        }
        centres.push(normalize(&vectors[indices[pick]]));
    }
    centres
}

fn nearest_centre(v: &[f64], centres: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_sim = f64::NEG_INFINITY;
    for (c, centre) in centres.iter().enumerate() {
        let sim = cosine_similarity(v, centre);
        if sim > best_sim {
            best_sim = sim;
            best = c;
        }
    }
    best
}
