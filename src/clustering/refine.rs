// Post-processing of the density partition.
//
// Density clustering on short texts tends to fragment one position into
// several near-identical clusters, and occasionally lumps two unrelated
// positions together through a chain of neighbours. The merge pass fixes the
// first, the split pass the second.

use tracing::debug;

use super::vector::{centroid, cosine_similarity};

/// Merge clusters whose centroids are at least `threshold` similar.
///
/// Grouping is the transitive closure of the similarity relation over the
/// centroids as they were at the start of the pass. Merged groups are emitted
/// in order of their first cluster; members are concatenated in cluster order.
pub fn merge_similar(vectors: &[Vec<f64>], groups: Vec<Vec<usize>>, threshold: f64) -> Vec<Vec<usize>> {
    let count = groups.len();
    if count < 2 {
        return groups;
    }

    let centroids: Vec<Vec<f64>> = groups.iter().map(|g| centroid(vectors, g)).collect();
    let mut parent: Vec<usize> = (0..count).collect();

    for i in 0..count {
        for j in (i + 1)..count {
            if cosine_similarity(&centroids[i], &centroids[j]) >= threshold {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    // Root is always the lower index so group order is stable.
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    let mut merged: Vec<Vec<usize>> = Vec::new();
    let mut slot_of_root: Vec<Option<usize>> = vec![None; count];
    for (i, group) in groups.into_iter().enumerate() {
        let root = find(&mut parent, i);
        match slot_of_root[root] {
            Some(slot) => merged[slot].extend(group),
            None => {
                slot_of_root[root] = Some(merged.len());
                merged.push(group);
            }
        }
    }

    if merged.len() < count {
        debug!(before = count, after = merged.len(), "Merged similar clusters");
    }
    merged
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Split clusters whose least similar pair falls below `floor`.
///
/// Clusters of two or fewer members are left alone. Sub-clusters replace
/// their parent in place, first-seed half first.
pub fn split_incohesive(vectors: &[Vec<f64>], groups: Vec<Vec<usize>>, floor: f64) -> Vec<Vec<usize>> {
    let before = groups.len();
    let mut out = Vec::with_capacity(before);
    for group in groups {
        bisect(vectors, group, floor, &mut out);
    }
    if out.len() > before {
        debug!(before, after = out.len(), "Split incohesive clusters");
    }
    out
}

fn bisect(vectors: &[Vec<f64>], group: Vec<usize>, floor: f64, out: &mut Vec<Vec<usize>>) {
    if group.len() <= 2 {
        out.push(group);
        return;
    }

    let Some((seed_a, seed_b, min_sim)) = least_similar_pair(vectors, &group) else {
        out.push(group);
        return;
    };
    if min_sim >= floor {
        out.push(group);
        return;
    }

    let mut left = Vec::new();
    let mut right = Vec::new();
    for &member in &group {
        if member == seed_a {
            left.push(member);
        } else if member == seed_b {
            right.push(member);
        } else {
            let to_a = cosine_similarity(&vectors[member], &vectors[seed_a]);
            let to_b = cosine_similarity(&vectors[member], &vectors[seed_b]);
            if to_a >= to_b {
                left.push(member);
            } else {
                right.push(member);
            }
        }
    }

    bisect(vectors, left, floor, out);
    bisect(vectors, right, floor, out);
}

/// First pair (in member order) with the lowest similarity.
fn least_similar_pair(vectors: &[Vec<f64>], group: &[usize]) -> Option<(usize, usize, f64)> {
    let mut worst: Option<(usize, usize, f64)> = None;
    for (pos, &i) in group.iter().enumerate() {
        for &j in &group[pos + 1..] {
            let sim = cosine_similarity(&vectors[i], &vectors[j]);
            match worst {
                Some((_, _, w)) if sim >= w => {}
                _ => worst = Some((i, j, sim)),
            }
        }
    }
    worst
}

/// Lowest pairwise cosine similarity within a group (1.0 for fewer than two).
pub fn min_pairwise_similarity(vectors: &[Vec<f64>], group: &[usize]) -> f64 {
    least_similar_pair(vectors, group).map_or(1.0, |(_, _, sim)| sim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_leaves_distinct_clusters() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let merged = merge_similar(&vectors, vec![vec![0], vec![1]], 0.82);
        assert_eq!(merged, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_merge_threshold_is_inclusive() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        let merged = merge_similar(&vectors, vec![vec![0], vec![1]], 1.0);
        assert_eq!(merged, vec![vec![0, 1]]);
    }

    #[test]
    fn test_split_keeps_pairs() {
        let vectors = vec![vec![1.0, 0.0], vec![-1.0, 0.0]];
        let split = split_incohesive(&vectors, vec![vec![0, 1]], 0.65);
        assert_eq!(split, vec![vec![0, 1]]);
    }

    #[test]
    fn test_least_similar_pair_first_on_ties() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 1.0]];
        let (a, b, sim) = least_similar_pair(&vectors, &[0, 1, 2]).unwrap();
        assert_eq!((a, b), (0, 1));
        assert!(sim.abs() < 1e-12);
    }

    #[test]
    fn test_min_pairwise_similarity_small_groups() {
        let vectors = vec![vec![1.0, 0.0]];
        assert_eq!(min_pairwise_similarity(&vectors, &[0]), 1.0);
        assert_eq!(min_pairwise_similarity(&vectors, &[]), 1.0);
    }
}
