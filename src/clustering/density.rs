// Density clustering with progressively more lenient retries.
//
// HDBSCAN on short, skewed text corpora is unstable: the adaptive parameters
// sometimes label everything noise. We run up to three attempts, each more
// lenient than the last, score each one, and keep the best partition. An
// attempt with no clusters never wins on score; if every attempt comes back
// empty, the most lenient one is used anyway so the pipeline always moves on.

use serde::Serialize;
use tracing::debug;

use super::hdbscan::{hdbscan, HdbscanParams, MIN_VIABLE_CLUSTER_SIZE};
use super::params::DensityParams;
use super::quality::{evaluate, QualityReport};
use super::vector::distance_matrix;

/// Pairwise distances at or below this are treated as identical points.
const DEGENERATE_DISTANCE: f64 = 1e-9;

/// One trial of the density clusterer.
#[derive(Debug, Clone, Serialize)]
pub struct RunAttempt {
    /// 0 = strictest, 2 = most lenient.
    pub index: usize,
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub allow_single_cluster: bool,
    /// One label per point; `None` is noise.
    pub labels: Vec<Option<usize>>,
    pub quality: QualityReport,
}

/// The three parameter sets tried, strictest first.
pub fn attempt_schedule(base: DensityParams) -> [HdbscanParams; 3] {
    [
        HdbscanParams {
            min_cluster_size: base.min_cluster_size,
            min_samples: base.min_samples,
            allow_single_cluster: false,
        },
        HdbscanParams {
            min_cluster_size: base.min_cluster_size.saturating_sub(1).max(1),
            min_samples: base.min_samples.saturating_sub(1).max(1),
            allow_single_cluster: true,
        },
        HdbscanParams {
            min_cluster_size: MIN_VIABLE_CLUSTER_SIZE,
            min_samples: 1,
            allow_single_cluster: true,
        },
    ]
}

/// Cluster unit vectors, retrying with more lenient parameters, and return
/// the winning attempt.
///
/// If every pair of points is numerically identical, no attempt runs and all
/// points form a single cluster.
pub fn cluster_with_retries(vectors: &[Vec<f64>], base: DensityParams) -> RunAttempt {
    let dist = distance_matrix(vectors);

    if is_degenerate(&dist) {
        debug!(points = vectors.len(), "All points identical, using one cluster");
        let labels = vec![Some(0); vectors.len()];
        let quality = evaluate(&dist, &labels);
        return RunAttempt {
            index: 0,
            min_cluster_size: vectors.len(),
            min_samples: 1,
            allow_single_cluster: true,
            labels,
            quality,
        };
    }

    let mut attempts: Vec<RunAttempt> = Vec::with_capacity(3);
    for (index, params) in attempt_schedule(base).into_iter().enumerate() {
        // An attempt identical to an earlier one can't do better than it.
        if attempts.iter().any(|a| same_params(a, &params)) {
            continue;
        }

        let labels = hdbscan(&dist, &params);
        let quality = evaluate(&dist, &labels);
        debug!(
            attempt = index,
            min_cluster_size = params.min_cluster_size,
            min_samples = params.min_samples,
            allow_single = params.allow_single_cluster,
            clusters = quality.cluster_count,
            silhouette = quality.silhouette,
            noise_ratio = quality.noise_ratio,
            score = quality.score,
            "Density clustering attempt"
        );

        attempts.push(RunAttempt {
            index,
            min_cluster_size: params.min_cluster_size,
            min_samples: params.min_samples,
            allow_single_cluster: params.allow_single_cluster,
            labels,
            quality,
        });
    }

    let winner = best_attempt(&attempts).unwrap_or(attempts.len() - 1);
    attempts.swap_remove(winner)
}

/// Highest score among attempts that found at least one cluster; ties keep
/// the earlier attempt.
fn best_attempt(attempts: &[RunAttempt]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, attempt) in attempts.iter().enumerate() {
        if attempt.quality.cluster_count == 0 {
            continue;
        }
        match best {
            Some(b) if attempt.quality.score <= attempts[b].quality.score => {}
            _ => best = Some(i),
        }
    }
    best
}

fn same_params(attempt: &RunAttempt, params: &HdbscanParams) -> bool {
    attempt.min_cluster_size.max(MIN_VIABLE_CLUSTER_SIZE)
        == params.min_cluster_size.max(MIN_VIABLE_CLUSTER_SIZE)
        && attempt.min_samples == params.min_samples
        && attempt.allow_single_cluster == params.allow_single_cluster
}

fn is_degenerate(dist: &[Vec<f64>]) -> bool {
    dist.iter()
        .flat_map(|row| row.iter())
        .all(|&d| d <= DEGENERATE_DISTANCE)
}
