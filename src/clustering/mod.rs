// Opinion clustering: group opinions into a few representative positions.
//
// Pipeline per run: unit-normalise embeddings, pick density parameters from
// the opinion count, run density clustering with retries, fold noise back in,
// merge near-duplicate clusters, split incohesive ones, then pick a leader for
// each final cluster. Every opinion ends up in exactly one cluster.

pub mod density;
pub mod hdbscan;
pub mod kmeans;
pub mod leader;
pub mod noise;
pub mod normalize;
pub mod params;
pub mod quality;
pub mod refine;
pub mod vector;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::models::Opinion;
use density::{cluster_with_retries, RunAttempt};
use kmeans::KMeansConfig;
use leader::{highest_weight, LeaderSelectionStrategy, WeightedCentrality, WeightedLottery};
use noise::{reassign_noise, NoisePolicy};

/// A group of opinions with the one that speaks for it.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    /// Leader first, the rest in input order. Never empty.
    members: Vec<Opinion>,
    heading: String,
}

impl Cluster {
    /// Build a cluster led by `members[leader]`. The heading starts out as the
    /// leader's text. Returns `None` for an empty member list or an
    /// out-of-range leader.
    pub fn with_leader(mut members: Vec<Opinion>, leader: usize) -> Option<Self> {
        if leader >= members.len() {
            return None;
        }
        let lead = members.remove(leader);
        let heading = lead.text.clone();
        members.insert(0, lead);
        Some(Self { members, heading })
    }

    pub fn leader(&self) -> &Opinion {
        &self.members[0]
    }

    pub fn members(&self) -> &[Opinion] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }

    pub fn set_heading(&mut self, heading: String) {
        self.heading = heading;
    }

    pub fn member_ids(&self) -> Vec<i64> {
        self.members.iter().map(|m| m.id).collect()
    }
}

/// Which leader selection strategy a clusterer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderStrategyKind {
    Centrality,
    Lottery,
}

impl std::str::FromStr for LeaderStrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "centrality" => Ok(LeaderStrategyKind::Centrality),
            "lottery" => Ok(LeaderStrategyKind::Lottery),
            other => bail!("unknown leader strategy '{other}' (expected centrality or lottery)"),
        }
    }
}

/// Tunable constants of the clustering pipeline.
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    /// Centroid similarity at or above which clusters merge.
    pub merge_threshold: f64,
    /// Clusters whose least similar pair is below this get split.
    pub split_floor: f64,
    /// Noise joins a cluster only above this centroid similarity.
    pub noise_similarity: f64,
    pub max_noise_singletons: usize,
    pub max_single_noise_group: usize,
    pub leader_weight_share: f64,
    pub kmeans_seed: u64,
    pub kmeans_max_iterations: usize,
    pub leader_strategy: LeaderStrategyKind,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.82,
            split_floor: 0.65,
            noise_similarity: 0.7,
            max_noise_singletons: 2,
            max_single_noise_group: 5,
            leader_weight_share: 0.6,
            kmeans_seed: 42,
            kmeans_max_iterations: 100,
            leader_strategy: LeaderStrategyKind::Centrality,
        }
    }
}

impl ClusteringConfig {
    fn noise_policy(&self) -> NoisePolicy {
        NoisePolicy {
            max_singletons: self.max_noise_singletons,
            similarity_floor: self.noise_similarity,
            max_single_group: self.max_single_noise_group,
            kmeans: KMeansConfig {
                seed: self.kmeans_seed,
                max_iterations: self.kmeans_max_iterations,
            },
        }
    }
}

/// Result of one clustering run: the clusters plus the density attempt that
/// produced them (absent when fewer than two opinions skip clustering).
#[derive(Debug, Clone, Serialize)]
pub struct ClusteringRun {
    pub clusters: Vec<Cluster>,
    pub attempt: Option<RunAttempt>,
}

/// The clustering engine. Pure and synchronous; callers run it on a blocking
/// thread.
pub struct OpinionClusterer {
    config: ClusteringConfig,
    strategy: Box<dyn LeaderSelectionStrategy>,
}

impl OpinionClusterer {
    pub fn new(config: ClusteringConfig) -> Self {
        let strategy: Box<dyn LeaderSelectionStrategy> = match config.leader_strategy {
            LeaderStrategyKind::Centrality => Box::new(WeightedCentrality {
                weight_share: config.leader_weight_share,
            }),
            LeaderStrategyKind::Lottery => Box::new(WeightedLottery {
                seed: config.kmeans_seed,
            }),
        };
        Self { config, strategy }
    }

    pub fn with_strategy(config: ClusteringConfig, strategy: Box<dyn LeaderSelectionStrategy>) -> Self {
        Self { config, strategy }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Cluster opinions given one embedding per opinion.
    pub fn cluster(&self, opinions: &[Opinion], embeddings: &[Vec<f64>]) -> Result<Vec<Cluster>> {
        Ok(self.run(opinions, embeddings)?.clusters)
    }

    /// Like [`cluster`](Self::cluster), but also returns the winning density
    /// attempt for diagnostics.
    ///
    /// Fails only when `embeddings` doesn't match `opinions` in count, or the
    /// vectors disagree in dimension.
    pub fn run(&self, opinions: &[Opinion], embeddings: &[Vec<f64>]) -> Result<ClusteringRun> {
        let n = opinions.len();
        validate_embeddings(n, embeddings)?;

        if n == 0 {
            return Ok(ClusteringRun {
                clusters: Vec::new(),
                attempt: None,
            });
        }
        if n == 1 {
            let clusters = Cluster::with_leader(opinions.to_vec(), 0).into_iter().collect();
            return Ok(ClusteringRun {
                clusters,
                attempt: None,
            });
        }

        let unit: Vec<Vec<f64>> = embeddings.iter().map(|e| vector::normalize(e)).collect();
        let base = params::adaptive_parameters(n);
        let attempt = cluster_with_retries(&unit, base);

        let groups = reassign_noise(&unit, &attempt.labels, &self.config.noise_policy());
        let groups = refine::merge_similar(&unit, groups, self.config.merge_threshold);
        let mut groups = refine::split_incohesive(&unit, groups, self.config.split_floor);
        groups.retain(|g| !g.is_empty());

        let clusters = if is_partition(&groups, n) {
            // Largest first; equal sizes by earliest member
            groups.sort_by(|a, b| {
                b.len()
                    .cmp(&a.len())
                    .then_with(|| a.iter().min().cmp(&b.iter().min()))
            });
            groups
                .into_iter()
                .filter_map(|group| self.build_cluster(opinions, &unit, group))
                .collect()
        } else {
            warn!(opinions = n, "Clustering lost opinions, falling back to one cluster");
            Vec::new()
        };
        let clusters = if clusters.is_empty() {
            fallback_cluster(opinions)
        } else {
            clusters
        };

        info!(
            opinions = n,
            clusters = clusters.len(),
            attempt = attempt.index,
            noise_ratio = attempt.quality.noise_ratio,
            silhouette = attempt.quality.silhouette,
            "Clustered opinions"
        );

        Ok(ClusteringRun {
            clusters,
            attempt: Some(attempt),
        })
    }

    fn build_cluster(&self, opinions: &[Opinion], unit: &[Vec<f64>], mut group: Vec<usize>) -> Option<Cluster> {
        group.sort_unstable();
        let members: Vec<&Opinion> = group.iter().map(|&i| &opinions[i]).collect();
        let vectors: Vec<&[f64]> = group.iter().map(|&i| unit[i].as_slice()).collect();
        let leader = self.strategy.select(&members, Some(&vectors));
        let leader = if leader < members.len() { leader } else { highest_weight(&members) };
        Cluster::with_leader(members.into_iter().cloned().collect(), leader)
    }
}

/// All opinions in one cluster, led by the heaviest one.
fn fallback_cluster(opinions: &[Opinion]) -> Vec<Cluster> {
    let refs: Vec<&Opinion> = opinions.iter().collect();
    let leader = highest_weight(&refs);
    Cluster::with_leader(opinions.to_vec(), leader).into_iter().collect()
}

fn validate_embeddings(n: usize, embeddings: &[Vec<f64>]) -> Result<()> {
    if embeddings.len() != n {
        bail!("expected {n} embeddings, got {}", embeddings.len());
    }
    if let Some(first) = embeddings.first() {
        let dim = first.len();
        if dim == 0 {
            bail!("embeddings have zero dimension");
        }
        if let Some(pos) = embeddings.iter().position(|e| e.len() != dim) {
            bail!(
                "embedding {pos} has dimension {}, expected {dim}",
                embeddings[pos].len()
            );
        }
    }
    Ok(())
}

/// True when every index in `0..n` appears in exactly one group.
fn is_partition(groups: &[Vec<usize>], n: usize) -> bool {
    let mut seen = vec![false; n];
    for &i in groups.iter().flatten() {
        if i >= n || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    seen.into_iter().all(|s| s)
}
