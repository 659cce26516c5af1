// Composition tests: the clustering pipeline end to end.
//
// These tests feed hand-built embeddings through OpinionClusterer and check
// the properties every run must hold: each opinion in exactly one cluster,
// leaders drawn from their own cluster, and the same input giving the same
// output. No model, database, or network is involved.

use quorum::clustering::{ClusteringConfig, LeaderStrategyKind, OpinionClusterer};
use quorum::db::models::Opinion;

fn op(id: i64, text: &str, weight: i64) -> Opinion {
    Opinion {
        id,
        author: format!("user{id}"),
        text: text.to_string(),
        weight,
    }
}

/// Two well-separated groups of near-duplicates: ids 1..=per_group point
/// along the first axis, the rest along the third.
fn two_positions(per_group: usize) -> (Vec<Opinion>, Vec<Vec<f64>>) {
    let mut opinions = Vec::new();
    let mut embeddings = Vec::new();
    for i in 0..per_group {
        let jitter = 0.01 * (i as f64 + 1.0);
        opinions.push(op(i as i64 + 1, &format!("more parking {i}"), 5));
        embeddings.push(vec![1.0, jitter, 0.0]);
    }
    for i in 0..per_group {
        let jitter = 0.01 * (i as f64 + 1.0);
        opinions.push(op((per_group + i) as i64 + 1, &format!("better buses {i}"), 5));
        embeddings.push(vec![0.0, jitter, 1.0]);
    }
    (opinions, embeddings)
}

fn assert_partition(opinions: &[Opinion], clusters: &[quorum::clustering::Cluster]) {
    let mut seen: Vec<i64> = clusters.iter().flat_map(|c| c.member_ids()).collect();
    seen.sort_unstable();
    let mut expected: Vec<i64> = opinions.iter().map(|o| o.id).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected, "every opinion must land in exactly one cluster");
}

// ============================================================
// Degenerate inputs
// ============================================================

#[test]
fn no_opinions_yields_no_clusters() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let clusters = clusterer.cluster(&[], &[]).unwrap();
    assert!(clusters.is_empty());
}

#[test]
fn single_opinion_leads_its_own_cluster() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let opinions = vec![op(1, "fix parking", 7)];
    let clusters = clusterer.cluster(&opinions, &[vec![0.3, 0.4]]).unwrap();

    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].leader().id, 1);
    assert_eq!(clusters[0].member_ids(), vec![1]);
    assert_eq!(clusters[0].heading(), "fix parking");
}

#[test]
fn mismatched_embeddings_are_rejected() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let opinions = vec![op(1, "a", 5), op(2, "b", 5)];
    assert!(clusterer.cluster(&opinions, &[vec![1.0, 0.0]]).is_err());
    assert!(clusterer
        .cluster(&opinions, &[vec![1.0, 0.0], vec![1.0]])
        .is_err());
}

#[test]
fn identical_embeddings_form_one_cluster() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let opinions: Vec<Opinion> = (1..=4).map(|id| op(id, "same words", 5)).collect();
    let embeddings = vec![vec![0.6, 0.8]; 4];
    let clusters = clusterer.cluster(&opinions, &embeddings).unwrap();

    assert_eq!(clusters.len(), 1);
    assert_partition(&opinions, &clusters);
}

// ============================================================
// Two clear positions
// ============================================================

#[test]
fn two_separated_groups_become_two_clusters() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let (opinions, embeddings) = two_positions(12);
    let clusters = clusterer.cluster(&opinions, &embeddings).unwrap();

    assert_eq!(clusters.len(), 2);
    assert_partition(&opinions, &clusters);
    for cluster in &clusters {
        assert_eq!(cluster.len(), 12);
        let parking = cluster.member_ids().iter().filter(|&&id| id <= 12).count();
        assert!(
            parking == 0 || parking == 12,
            "cluster mixes the two positions: {:?}",
            cluster.member_ids()
        );
    }
}

#[test]
fn run_reports_winning_attempt() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let (opinions, embeddings) = two_positions(12);
    let run = clusterer.run(&opinions, &embeddings).unwrap();

    let attempt = run.attempt.expect("24 opinions go through density clustering");
    assert_eq!(attempt.labels.len(), 24);
    assert!(attempt.quality.silhouette > 0.5);
    assert_eq!(attempt.quality.noise_ratio, 0.0);
}

#[test]
fn clusters_are_ordered_largest_first() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let (mut opinions, mut embeddings) = two_positions(6);
    // Three more voices for buses
    for i in 0..3 {
        opinions.push(op(100 + i, &format!("bus lanes {i}"), 5));
        embeddings.push(vec![0.0, 0.07 + 0.01 * i as f64, 1.0]);
    }
    let clusters = clusterer.cluster(&opinions, &embeddings).unwrap();

    assert_partition(&opinions, &clusters);
    for pair in clusters.windows(2) {
        assert!(pair[0].len() >= pair[1].len());
    }
}

// ============================================================
// Leaders
// ============================================================

#[test]
fn leader_is_a_member_and_heading_is_its_text() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let (opinions, embeddings) = two_positions(8);
    for cluster in clusterer.cluster(&opinions, &embeddings).unwrap() {
        let leader = cluster.leader();
        assert!(cluster.members().iter().any(|m| m.id == leader.id));
        assert_eq!(cluster.members()[0].id, leader.id);
        assert_eq!(cluster.heading(), leader.text);
    }
}

#[test]
fn heavier_opinion_takes_the_lead() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let (mut opinions, embeddings) = two_positions(8);
    // An off-centre parking opinion outweighs the rest of its group.
    opinions[7].weight = 10;
    let clusters = clusterer.cluster(&opinions, &embeddings).unwrap();

    let parking = clusters
        .iter()
        .find(|c| c.member_ids().contains(&8))
        .expect("opinion 8 is clustered");
    assert_eq!(parking.leader().id, 8);
}

#[test]
fn raising_the_leaders_weight_keeps_it_leader() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let (mut opinions, embeddings) = two_positions(8);
    let before = clusterer.cluster(&opinions, &embeddings).unwrap();
    let leader_ids: Vec<i64> = before.iter().map(|c| c.leader().id).collect();

    for opinion in &mut opinions {
        if leader_ids.contains(&opinion.id) {
            opinion.weight = 9;
        }
    }
    let after = clusterer.cluster(&opinions, &embeddings).unwrap();
    let mut after_ids: Vec<i64> = after.iter().map(|c| c.leader().id).collect();
    let mut leader_ids = leader_ids;
    leader_ids.sort_unstable();
    after_ids.sort_unstable();
    assert_eq!(after_ids, leader_ids);
}

#[test]
fn lottery_strategy_still_partitions() {
    let config = ClusteringConfig {
        leader_strategy: LeaderStrategyKind::Lottery,
        ..ClusteringConfig::default()
    };
    let clusterer = OpinionClusterer::new(config);
    let (opinions, embeddings) = two_positions(6);
    let clusters = clusterer.cluster(&opinions, &embeddings).unwrap();

    assert_partition(&opinions, &clusters);
    for cluster in &clusters {
        assert_eq!(cluster.members()[0].id, cluster.leader().id);
    }
}

// ============================================================
// Determinism
// ============================================================

#[test]
fn same_input_same_clusters() {
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let (opinions, embeddings) = two_positions(10);

    let first: Vec<(i64, Vec<i64>)> = clusterer
        .cluster(&opinions, &embeddings)
        .unwrap()
        .iter()
        .map(|c| (c.leader().id, c.member_ids()))
        .collect();
    let second: Vec<(i64, Vec<i64>)> = clusterer
        .cluster(&opinions, &embeddings)
        .unwrap()
        .iter()
        .map(|c| (c.leader().id, c.member_ids()))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn scattered_opinions_are_all_placed() {
    // Every opinion points its own way; nothing is dense.
    let clusterer = OpinionClusterer::new(ClusteringConfig::default());
    let dims = 9;
    let opinions: Vec<Opinion> = (0..dims).map(|i| op(i as i64 + 1, &format!("idea {i}"), 5)).collect();
    let embeddings: Vec<Vec<f64>> = (0..dims)
        .map(|i| {
            let mut v = vec![0.0; dims];
            v[i] = 1.0;
            v
        })
        .collect();

    let clusters = clusterer.cluster(&opinions, &embeddings).unwrap();
    assert!(!clusters.is_empty());
    assert_partition(&opinions, &clusters);
}
