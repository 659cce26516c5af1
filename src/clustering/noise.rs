// Noise reassignment: turn the winning partition's outliers into clusters.
//
// A couple of stray opinions are real minority positions and stay alone.
// Beyond that, outliers that sit close to an existing cluster's centroid join
// it; whatever is left becomes one "other" group, or a few k-means groups if
// there are too many to lump together.

use std::collections::BTreeMap;

use tracing::debug;

use super::kmeans::{kmeans, KMeansConfig};
use super::vector::{centroid, cosine_similarity};

/// Thresholds for noise handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoisePolicy {
    /// At most this many noise points each become a singleton cluster.
    pub max_singletons: usize,
    /// A noise point joins a cluster only if centroid similarity exceeds this.
    pub similarity_floor: f64,
    /// Up to this many unassigned points form a single cluster.
    pub max_single_group: usize,
    pub kmeans: KMeansConfig,
}

impl Default for NoisePolicy {
    fn default() -> Self {
        Self {
            max_singletons: 2,
            similarity_floor: 0.7,
            max_single_group: 5,
            kmeans: KMeansConfig::default(),
        }
    }
}

/// Convert labels (noise = `None`) into groups of point indices so that every
/// point lands in exactly one group. Clustered groups come first in label
/// order, then noise-derived groups. Each group is sorted ascending.
pub fn reassign_noise(
    vectors: &[Vec<f64>],
    labels: &[Option<usize>],
    policy: &NoisePolicy,
) -> Vec<Vec<usize>> {
    let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut noise = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        match label {
            Some(label) => by_label.entry(*label).or_default().push(i),
            None => noise.push(i),
        }
    }
    let mut groups: Vec<Vec<usize>> = by_label.into_values().collect();

    if noise.len() <= policy.max_singletons {
        groups.extend(noise.into_iter().map(|i| vec![i]));
        return groups;
    }

    let centroids: Vec<Vec<f64>> = groups.iter().map(|g| centroid(vectors, g)).collect();
    let mut unassigned = Vec::new();
    let mut reassigned = 0usize;

    for point in noise {
        let mut best: Option<(usize, f64)> = None;
        for (c, centre) in centroids.iter().enumerate() {
            let sim = cosine_similarity(&vectors[point], centre);
            match best {
                Some((_, best_sim)) if sim <= best_sim => {}
                _ => best = Some((c, sim)),
            }
        }

        match best {
            Some((c, sim)) if sim > policy.similarity_floor => {
                groups[c].push(point);
                reassigned += 1;
            }
            _ => unassigned.push(point),
        }
    }

    for group in &mut groups {
        group.sort_unstable();
    }

    debug!(
        reassigned,
        unassigned = unassigned.len(),
        "Noise reassignment"
    );

    if unassigned.is_empty() {
        return groups;
    }

    if unassigned.len() <= policy.max_single_group {
        groups.push(unassigned);
    } else {
        let k = (unassigned.len() / 3).clamp(2, 3);
        groups.extend(kmeans(vectors, &unassigned, k, &policy.kmeans));
    }

    groups
}
