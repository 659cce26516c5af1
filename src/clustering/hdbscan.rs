// HDBSCAN over a precomputed distance matrix, leaf cluster selection.
//
// Steps: core distances -> mutual reachability -> minimum spanning tree (Prim,
// dense O(n^2), fine for the few hundred opinions a topic collects) ->
// single-linkage hierarchy -> condensed tree pruned at `min_cluster_size` ->
// leaf clusters -> point labels.
//
// Leaf selection never looks at cluster stability, so stability isn't computed.

use std::collections::{BTreeMap, VecDeque};

/// Smallest cluster the condensed tree can represent.
pub const MIN_VIABLE_CLUSTER_SIZE: usize = 2;

/// Distances below this are treated as this value when converting to lambda,
/// so identical points get a large finite density instead of infinity.
const MIN_DISTANCE: f64 = 1e-12;

/// Parameters for one HDBSCAN run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdbscanParams {
    /// Smallest group that counts as a cluster. Values below 2 are raised to 2.
    pub min_cluster_size: usize,
    /// Neighbourhood size for core distances, counting the point itself.
    pub min_samples: usize,
    /// Whether the root of the hierarchy may be returned as the only cluster.
    pub allow_single_cluster: bool,
}

/// One merge in the single-linkage hierarchy.
#[derive(Debug, Clone, Copy)]
struct LinkageNode {
    left: usize,
    right: usize,
    distance: f64,
}

/// One row of the condensed tree: `child` is either a point (< n) or a
/// cluster label (>= n).
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }
}

/// Cluster the points described by `dist` (symmetric, zero diagonal).
///
/// Returns one label per point; `None` marks noise. Cluster labels are dense
/// (0..k) and ordered by their position in the condensed tree.
pub fn hdbscan(dist: &[Vec<f64>], params: &HdbscanParams) -> Vec<Option<usize>> {
    let n = dist.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![params.allow_single_cluster.then_some(0)],
        _ => {}
    }

    let min_cluster_size = params.min_cluster_size.max(MIN_VIABLE_CLUSTER_SIZE);
    let core = core_distances(dist, params.min_samples);
    let mst = minimum_spanning_tree(dist, &core);
    let (linkage, sizes) = single_linkage(n, mst);
    let (condensed, cluster_count) = condense(n, &linkage, &sizes, min_cluster_size);
    let selected = select_leaves(n, &condensed, cluster_count, params.allow_single_cluster);
    label_points(n, &condensed, &selected)
}

/// Distance to the `min_samples`-th nearest neighbour, the point itself
/// included (so `min_samples = 1` gives zero core distances).
fn core_distances(dist: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    let k = min_samples.clamp(1, dist.len());
    dist.iter()
        .map(|row| {
            let mut sorted = row.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            sorted[k - 1]
        })
        .collect()
}

/// Prim's algorithm over the implicit mutual-reachability graph.
/// Returns n - 1 edges `(from, to, weight)`.
fn minimum_spanning_tree(dist: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = dist.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut best_from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[current] = true;

    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = dist[current][j].max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                best_from[j] = current;
            }
        }

        let mut next = None;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            match next {
                Some(k) if best[j] >= best[k] => {}
                _ => next = Some(j),
            }
        }

        let Some(next) = next else { break };
        edges.push((best_from[next], next, best[next]));
        in_tree[next] = true;
        current = next;
    }

    edges
}

/// Build the single-linkage hierarchy from MST edges. Internal node `n + k`
/// is the k-th merge; the root is `2n - 2`. Returns the merges and the size
/// of every node (leaves included).
fn single_linkage(
    n: usize,
    mut edges: Vec<(usize, usize, f64)>,
) -> (Vec<LinkageNode>, Vec<usize>) {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut uf = UnionFind::new(2 * n - 1);
    let mut sizes = vec![1usize; 2 * n - 1];
    let mut linkage = Vec::with_capacity(n - 1);

    for (k, (a, b, distance)) in edges.into_iter().enumerate() {
        let left = uf.find(a);
        let right = uf.find(b);
        let node = n + k;
        sizes[node] = sizes[left] + sizes[right];
        uf.parent[left] = node;
        uf.parent[right] = node;
        linkage.push(LinkageNode {
            left,
            right,
            distance,
        });
    }

    (linkage, sizes)
}

/// All points under a hierarchy node.
fn points_under(n: usize, linkage: &[LinkageNode], node: usize) -> Vec<usize> {
    let mut points = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current < n {
            points.push(current);
        } else {
            let merge = &linkage[current - n];
            stack.push(merge.right);
            stack.push(merge.left);
        }
    }
    points
}

/// Walk the hierarchy top-down, keeping a split only when both sides reach
/// `min_cluster_size`. Smaller sides "fall out" of their parent cluster as
/// individual points. Returns the condensed edges and the number of cluster
/// labels (root included); labels run from n to n + count - 1, root = n.
fn condense(
    n: usize,
    linkage: &[LinkageNode],
    sizes: &[usize],
    min_cluster_size: usize,
) -> (Vec<CondensedEdge>, usize) {
    let root = 2 * n - 2;
    let mut relabel = vec![0usize; 2 * n - 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut edges = Vec::new();

    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        let merge = linkage[node - n];
        let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
        let parent = relabel[node];
        let left_big = sizes[merge.left] >= min_cluster_size;
        let right_big = sizes[merge.right] >= min_cluster_size;

        let fall_out = |child: usize, edges: &mut Vec<CondensedEdge>| {
            for point in points_under(n, linkage, child) {
                edges.push(CondensedEdge {
                    parent,
                    child: point,
                    lambda,
                });
            }
        };

        match (left_big, right_big) {
            (true, true) => {
                for child in [merge.left, merge.right] {
                    relabel[child] = next_label;
                    edges.push(CondensedEdge {
                        parent,
                        child: next_label,
                        lambda,
                    });
                    next_label += 1;
                    queue.push_back(child);
                }
            }
            (false, false) => {
                fall_out(merge.left, &mut edges);
                fall_out(merge.right, &mut edges);
            }
            (false, true) => {
                fall_out(merge.left, &mut edges);
                relabel[merge.right] = parent;
                queue.push_back(merge.right);
            }
            (true, false) => {
                fall_out(merge.right, &mut edges);
                relabel[merge.left] = parent;
                queue.push_back(merge.left);
            }
        }
    }

    (edges, next_label - n)
}

/// Leaf selection: every cluster without cluster children. If the tree never
/// split, the root is the only candidate and is kept only when allowed.
fn select_leaves(
    n: usize,
    condensed: &[CondensedEdge],
    cluster_count: usize,
    allow_single_cluster: bool,
) -> Vec<usize> {
    if cluster_count <= 1 {
        return if allow_single_cluster { vec![n] } else { Vec::new() };
    }

    let mut has_cluster_child = vec![false; cluster_count];
    for edge in condensed.iter().filter(|e| e.child >= n) {
        has_cluster_child[edge.parent - n] = true;
    }

    (n + 1..n + cluster_count)
        .filter(|&label| !has_cluster_child[label - n])
        .collect()
}

fn label_points(n: usize, condensed: &[CondensedEdge], selected: &[usize]) -> Vec<Option<usize>> {
    let root = n;
    let label_of: BTreeMap<usize, usize> = selected
        .iter()
        .enumerate()
        .map(|(i, &cluster)| (cluster, i))
        .collect();

    let mut cluster_parent: BTreeMap<usize, usize> = BTreeMap::new();
    let mut point_edge: Vec<Option<(usize, f64)>> = vec![None; n];
    for edge in condensed {
        if edge.child >= n {
            cluster_parent.insert(edge.child, edge.parent);
        } else {
            point_edge[edge.child] = Some((edge.parent, edge.lambda));
        }
    }

    // A lone root cluster only keeps the points that persisted to its
    // densest level; the rest are noise.
    let root_max_lambda = condensed
        .iter()
        .filter(|e| e.parent == root)
        .map(|e| e.lambda)
        .fold(f64::NEG_INFINITY, f64::max);

    point_edge
        .into_iter()
        .map(|entry| {
            let (mut cluster, lambda) = entry?;
            loop {
                if let Some(&label) = label_of.get(&cluster) {
                    if cluster == root && lambda < root_max_lambda {
                        return None;
                    }
                    return Some(label);
                }
                cluster = *cluster_parent.get(&cluster)?;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::vector::distance_matrix;

    /// Two tight groups on orthogonal axes.
    fn two_blobs(per_group: usize) -> Vec<Vec<f64>> {
        let mut vectors = Vec::new();
        for i in 0..per_group {
            let jitter = 0.01 * (i as f64 + 1.0);
            vectors.push(vec![1.0, jitter, 0.0]);
        }
        for i in 0..per_group {
            let jitter = 0.01 * (i as f64 + 1.0);
            vectors.push(vec![0.0, jitter, 1.0]);
        }
        vectors
    }

    fn params(mcs: usize, ms: usize, single: bool) -> HdbscanParams {
        HdbscanParams {
            min_cluster_size: mcs,
            min_samples: ms,
            allow_single_cluster: single,
        }
    }

    #[test]
    fn test_empty_and_single_point() {
        assert!(hdbscan(&[], &params(2, 1, false)).is_empty());
        assert_eq!(hdbscan(&[vec![0.0]], &params(2, 1, true)), vec![Some(0)]);
        assert_eq!(hdbscan(&[vec![0.0]], &params(2, 1, false)), vec![None]);
    }

    #[test]
    fn test_two_blobs_never_share_a_label() {
        let dist = distance_matrix(&two_blobs(6));
        let labels = hdbscan(&dist, &params(3, 2, false));
        for a in 0..6 {
            for b in 6..12 {
                if let (Some(x), Some(y)) = (labels[a], labels[b]) {
                    assert_ne!(x, y, "points {a} and {b} crossed groups");
                }
            }
        }
        assert!(labels.iter().any(|l| l.is_some()));
    }

    #[test]
    fn test_labels_are_dense() {
        let dist = distance_matrix(&two_blobs(5));
        let labels = hdbscan(&dist, &params(2, 1, false));
        let max = labels.iter().flatten().copied().max().unwrap();
        for label in 0..=max {
            assert!(labels.contains(&Some(label)), "label {label} unused");
        }
    }

    #[test]
    fn test_no_split_without_single_cluster_is_all_noise() {
        // Two points can never split into two clusters of size >= 2.
        let dist = distance_matrix(&[vec![1.0, 0.0], vec![0.9, 0.1]]);
        assert_eq!(hdbscan(&dist, &params(2, 1, false)), vec![None, None]);
    }

    #[test]
    fn test_two_points_single_cluster_allowed() {
        let dist = distance_matrix(&[vec![1.0, 0.0], vec![0.9, 0.1]]);
        assert_eq!(hdbscan(&dist, &params(2, 1, true)), vec![Some(0), Some(0)]);
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let dist = distance_matrix(&vec![vec![1.0, 0.0]; 5]);
        let labels = hdbscan(&dist, &params(2, 1, true));
        assert_eq!(labels.len(), 5);
    }

    #[test]
    fn test_min_cluster_size_below_two_is_raised() {
        let dist = distance_matrix(&two_blobs(4));
        assert_eq!(
            hdbscan(&dist, &params(0, 1, false)),
            hdbscan(&dist, &params(2, 1, false))
        );
    }

    #[test]
    fn test_core_distance_counts_self() {
        let dist = vec![vec![0.0, 0.5, 0.8], vec![0.5, 0.0, 0.3], vec![0.8, 0.3, 0.0]];
        assert_eq!(core_distances(&dist, 1), vec![0.0, 0.0, 0.0]);
        assert_eq!(core_distances(&dist, 2), vec![0.5, 0.3, 0.3]);
        // Clamped to n
        assert_eq!(core_distances(&dist, 10), vec![0.8, 0.5, 0.8]);
    }

    #[test]
    fn test_mst_has_n_minus_one_edges() {
        let dist = distance_matrix(&two_blobs(4));
        let core = core_distances(&dist, 1);
        assert_eq!(minimum_spanning_tree(&dist, &core).len(), 7);
    }
}
