// Partition quality: silhouette cohesion, noise ratio, cluster count.
//
// The combined score is a heuristic used only to rank clustering attempts
// against each other:
//
//   score = cohesion * (1 - noise_ratio) * cluster_count
//
// Cohesion is the mean cosine silhouette over non-noise points. It is only
// defined for 2 <= clusters < clustered points; outside that range (or on any
// non-finite result) it's 0.0, which zeroes the score without failing the run.

use std::collections::BTreeMap;

use serde::Serialize;

/// Quality metrics for one labelled partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityReport {
    /// Number of non-noise clusters.
    pub cluster_count: usize,
    /// Mean silhouette over clustered points, -1.0 to 1.0 (0.0 when undefined).
    pub silhouette: f64,
    /// Fraction of points labelled noise, 0.0 to 1.0.
    pub noise_ratio: f64,
    /// Combined ranking score.
    pub score: f64,
}

/// Combine the three metrics into one ranking score.
pub fn quality_score(cohesion: f64, noise_ratio: f64, cluster_count: usize) -> f64 {
    cohesion * (1.0 - noise_ratio) * cluster_count as f64
}

/// Evaluate a labelling against the distance matrix it was produced from.
pub fn evaluate(dist: &[Vec<f64>], labels: &[Option<usize>]) -> QualityReport {
    let total = labels.len();
    let noise = labels.iter().filter(|l| l.is_none()).count();
    let noise_ratio = if total == 0 {
        0.0
    } else {
        noise as f64 / total as f64
    };

    let members = group_by_label(labels);
    let cluster_count = members.len();
    let silhouette = silhouette(dist, labels, &members).unwrap_or(0.0);

    QualityReport {
        cluster_count,
        silhouette,
        noise_ratio,
        score: quality_score(silhouette, noise_ratio, cluster_count),
    }
}

fn group_by_label(labels: &[Option<usize>]) -> BTreeMap<usize, Vec<usize>> {
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        if let Some(label) = label {
            members.entry(*label).or_default().push(i);
        }
    }
    members
}

/// Mean silhouette coefficient over clustered points, or `None` when the
/// metric is undefined for this labelling.
fn silhouette(
    dist: &[Vec<f64>],
    labels: &[Option<usize>],
    members: &BTreeMap<usize, Vec<usize>>,
) -> Option<f64> {
    let clustered: usize = members.values().map(Vec::len).sum();
    if members.len() < 2 || members.len() >= clustered {
        return None;
    }

    let mut sum = 0.0;
    for (i, label) in labels.iter().enumerate() {
        let Some(own) = label else { continue };

        let own_members = &members[own];
        if own_members.len() == 1 {
            // Singleton clusters contribute 0 by convention.
            continue;
        }

        let a = own_members
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| dist[i][j])
            .sum::<f64>()
            / (own_members.len() - 1) as f64;

        let b = members
            .iter()
            .filter(|(other, _)| *other != own)
            .map(|(_, others)| others.iter().map(|&j| dist[i][j]).sum::<f64>() / others.len() as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            sum += (b - a) / denom;
        }
    }

    let mean = sum / clustered as f64;
    mean.is_finite().then_some(mean)
}
