// Leader selection: which member speaks for a cluster.
//
// The leader's text becomes the cluster heading, so the choice balances what
// participants said matters to them (weight) against how typical the opinion
// is of the group (closeness to the member mean in embedding space).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::db::models::Opinion;

/// Picks a leader among a cluster's members.
///
/// `members` is non-empty. `embeddings`, when given, is parallel to
/// `members`. Returns a position into `members`.
pub trait LeaderSelectionStrategy: Send + Sync {
    fn select(&self, members: &[&Opinion], embeddings: Option<&[&[f64]]>) -> usize;
}

/// Reference strategy: weighted score of importance and centrality.
#[derive(Debug, Clone, Copy)]
pub struct WeightedCentrality {
    /// Share of the score given to weight; the rest goes to centrality.
    pub weight_share: f64,
}

impl Default for WeightedCentrality {
    fn default() -> Self {
        Self { weight_share: 0.6 }
    }
}

impl LeaderSelectionStrategy for WeightedCentrality {
    fn select(&self, members: &[&Opinion], embeddings: Option<&[&[f64]]>) -> usize {
        if members.len() <= 1 {
            return 0;
        }
        let Some(embeddings) = embeddings.filter(|e| e.len() == members.len()) else {
            return highest_weight(members);
        };

        let weights: Vec<f64> = members.iter().map(|m| m.weight as f64).collect();
        let norm_weights = min_max(&weights, 1.0);

        let mean = mean_vector(embeddings);
        let distances: Vec<f64> = embeddings
            .iter()
            .map(|e| super::vector::euclidean_distance(e, &mean))
            .collect();
        let norm_distances = min_max(&distances, 0.0);

        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for i in 0..members.len() {
            let score = self.weight_share * norm_weights[i]
                + (1.0 - self.weight_share) * (1.0 - norm_distances[i]);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }
}

/// Historical strategy: draw a member with probability proportional to its
/// weight. The RNG is seeded from the configured seed and the member ids, so
/// a given cluster always draws the same leader.
#[derive(Debug, Clone, Copy)]
pub struct WeightedLottery {
    pub seed: u64,
}

impl LeaderSelectionStrategy for WeightedLottery {
    fn select(&self, members: &[&Opinion], _embeddings: Option<&[&[f64]]>) -> usize {
        let total: i64 = members.iter().map(|m| m.weight.max(0)).sum();
        if members.len() <= 1 || total <= 0 {
            return 0;
        }

        let mixed = members.iter().fold(self.seed, |acc, m| {
            acc.rotate_left(5) ^ (m.id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        });
        let mut rng = StdRng::seed_from_u64(mixed);
        let mut ticket = rng.random_range(0..total);

        for (i, member) in members.iter().enumerate() {
            let w = member.weight.max(0);
            if ticket < w {
                return i;
            }
            ticket -= w;
        }
        members.len() - 1
    }
}

/// Position of the highest-weight member, first on ties.
pub fn highest_weight(members: &[&Opinion]) -> usize {
    let mut best = 0;
    for (i, member) in members.iter().enumerate() {
        if member.weight > members[best].weight {
            best = i;
        }
    }
    best
}

/// Min-max normalise to [0, 1]; a constant series maps to `flat`.
fn min_max(values: &[f64], flat: f64) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= f64::EPSILON {
        return vec![flat; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

fn mean_vector(embeddings: &[&[f64]]) -> Vec<f64> {
    let dim = embeddings.first().map_or(0, |e| e.len());
    let mut mean = vec![0.0; dim];
    for e in embeddings {
        for (m, x) in mean.iter_mut().zip(e.iter()) {
            *m += x;
        }
    }
    let n = embeddings.len() as f64;
    for m in &mut mean {
        *m /= n;
    }
    mean
}
