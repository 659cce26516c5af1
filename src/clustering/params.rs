// Adaptive HDBSCAN parameters scaled to corpus size.
//
// Small topics need tiny clusters or everything becomes noise; large topics
// need bigger floors so clusters stay meaningful, but capped so a few hundred
// opinions still split into distinguishable positions.

/// Fraction of the corpus that makes a cluster.
const MIN_CLUSTER_SIZE_RATIO: f64 = 0.05;
/// Fraction of the corpus used as the core-point neighbourhood.
const MIN_SAMPLES_RATIO: f64 = 0.02;

/// Density parameters for one clustering attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DensityParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
}

fn scaled(n: usize, ratio: f64) -> usize {
    (n as f64 * ratio).round() as usize
}

/// Derive `(min_cluster_size, min_samples)` from the opinion count.
pub fn adaptive_parameters(n: usize) -> DensityParams {
    let (min_cluster_size, min_samples) = if n < 10 {
        ((n / 3).max(1), 1)
    } else if n < 50 {
        (
            scaled(n, MIN_CLUSTER_SIZE_RATIO).max(2),
            scaled(n, MIN_SAMPLES_RATIO).max(1),
        )
    } else if n < 200 {
        (
            scaled(n, MIN_CLUSTER_SIZE_RATIO).max(3),
            scaled(n, MIN_SAMPLES_RATIO).max(2),
        )
    } else {
        (
            scaled(n, MIN_CLUSTER_SIZE_RATIO).clamp(5, 20),
            scaled(n, MIN_SAMPLES_RATIO).clamp(2, 10),
        )
    };

    DensityParams {
        min_cluster_size,
        min_samples,
    }
}
