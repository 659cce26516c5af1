// Job runner tests: triggers, worker pool, and persistence against an
// in-memory SQLite database with fake embedding providers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Semaphore;

use quorum::clustering::{ClusteringConfig, OpinionClusterer};
use quorum::db::models::JobState;
use quorum::db::{Database, SqliteDatabase};
use quorum::embedding::EmbeddingProvider;
use quorum::headings::{HeadingRewriter, LeaderTextHeading};
use quorum::jobs::{JobError, JobRunner, RunnerConfig, TriggerError, WorkerContext};

/// Embeds "parking" texts along one axis and everything else along another,
/// nudged by the digits in the text so near-duplicates aren't identical.
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    let jitter = 0.01 * digits.parse::<f64>().unwrap_or(0.0);
    if text.contains("parking") {
        vec![1.0, jitter, 0.0]
    } else {
        vec![0.0, jitter, 1.0]
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
        anyhow::bail!("model files missing")
    }
}

/// Returns one vector too few.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(texts.iter().skip(1).map(|t| keyword_vector(t)).collect())
    }
}

/// Holds every call until the test hands out permits.
struct GatedEmbedder {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let _permit = self.gate.acquire().await?;
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

struct NeverEmbedder;

#[async_trait]
impl EmbeddingProvider for NeverEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
        std::future::pending().await
    }
}

struct ShoutingHeading;

#[async_trait]
impl HeadingRewriter for ShoutingHeading {
    async fn summarize(&self, leader_text: &str) -> Result<String> {
        Ok(leader_text.to_uppercase())
    }
}

struct BrokenHeading;

#[async_trait]
impl HeadingRewriter for BrokenHeading {
    async fn summarize(&self, _leader_text: &str) -> Result<String> {
        anyhow::bail!("summariser offline")
    }
}

fn context(db: Arc<dyn Database>, embedder: Arc<dyn EmbeddingProvider>) -> WorkerContext {
    WorkerContext {
        db,
        embedder,
        rewriter: Arc::new(LeaderTextHeading),
        clusterer: Arc::new(OpinionClusterer::new(ClusteringConfig::default())),
        embed_timeout: Duration::from_secs(10),
    }
}

fn memory_db() -> Arc<dyn Database> {
    Arc::new(SqliteDatabase::in_memory().unwrap())
}

/// A topic with six parking and six bus opinions.
async fn seeded_topic(db: &Arc<dyn Database>, title: &str) -> i64 {
    let topic_id = db.insert_topic(title).await.unwrap();
    for i in 1..=6 {
        db.insert_opinion(topic_id, &format!("p{i}"), &format!("More parking {i}"), 5)
            .await
            .unwrap();
    }
    for i in 1..=6 {
        db.insert_opinion(topic_id, &format!("b{i}"), &format!("Better buses {i}"), 5)
            .await
            .unwrap();
    }
    topic_id
}

fn single_worker() -> RunnerConfig {
    RunnerConfig {
        worker_count: 1,
        queue_capacity: 8,
    }
}

// ============================================================
// Processing a topic directly
// ============================================================

#[tokio::test]
async fn process_persists_clusters() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;

    let outcome = context(Arc::clone(&db), Arc::new(KeywordEmbedder))
        .process(topic_id)
        .await
        .unwrap();
    assert_eq!(outcome.opinion_count, 12);
    assert_eq!(outcome.cluster_count, 2);
    assert_eq!(outcome.cluster_ids.len(), 2);
    assert!(outcome.quality.is_some());

    let stored = db.get_clusters(topic_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    let mut member_count = 0;
    for cluster in &stored {
        assert_eq!(cluster.members[0].id, cluster.leader_id);
        assert_eq!(cluster.heading, cluster.members[0].text);
        let parking = cluster.members.iter().filter(|m| m.text.contains("parking")).count();
        assert!(parking == 0 || parking == cluster.members.len());
        member_count += cluster.members.len();
    }
    assert_eq!(member_count, 12);
}

#[tokio::test]
async fn process_uses_rewritten_headings() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;
    let mut ctx = context(Arc::clone(&db), Arc::new(KeywordEmbedder));
    ctx.rewriter = Arc::new(ShoutingHeading);

    ctx.process(topic_id).await.unwrap();
    for cluster in db.get_clusters(topic_id).await.unwrap() {
        assert_eq!(cluster.heading, cluster.members[0].text.to_uppercase());
    }
}

#[tokio::test]
async fn broken_rewriter_keeps_leader_text() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;
    let mut ctx = context(Arc::clone(&db), Arc::new(KeywordEmbedder));
    ctx.rewriter = Arc::new(BrokenHeading);

    ctx.process(topic_id).await.unwrap();
    for cluster in db.get_clusters(topic_id).await.unwrap() {
        assert_eq!(cluster.heading, cluster.members[0].text);
    }
}

#[tokio::test]
async fn empty_topic_is_an_error() {
    let db = memory_db();
    let topic_id = db.insert_topic("Nobody spoke").await.unwrap();

    let err = context(db, Arc::new(KeywordEmbedder))
        .process(topic_id)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::EmptyTopic { topic_id: t } if t == topic_id));
}

#[tokio::test]
async fn short_embedding_batch_is_a_mismatch() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;

    let err = context(db, Arc::new(ShortEmbedder))
        .process(topic_id)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::EmbeddingMismatch(_)));
}

#[tokio::test]
async fn slow_embedder_times_out() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;
    let mut ctx = context(db, Arc::new(NeverEmbedder));
    ctx.embed_timeout = Duration::from_millis(50);

    let err = ctx.process(topic_id).await.unwrap_err();
    assert!(matches!(err, JobError::EmbeddingUnavailable(_)));
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn failed_job_leaves_previous_clusters() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;

    context(Arc::clone(&db), Arc::new(KeywordEmbedder))
        .process(topic_id)
        .await
        .unwrap();
    let before = db.get_clusters(topic_id).await.unwrap();

    db.insert_opinion(topic_id, "late", "One more parking 7", 9)
        .await
        .unwrap();
    let err = context(Arc::clone(&db), Arc::new(FailingEmbedder))
        .process(topic_id)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::EmbeddingUnavailable(_)));

    let after = db.get_clusters(topic_id).await.unwrap();
    let ids = |clusters: &[quorum::db::models::StoredCluster]| -> Vec<(i64, Vec<i64>)> {
        clusters
            .iter()
            .map(|c| (c.id, c.members.iter().map(|m| m.id).collect()))
            .collect()
    };
    assert_eq!(ids(&after), ids(&before));
}

// ============================================================
// Runner: triggers and status
// ============================================================

#[tokio::test]
async fn triggered_job_runs_to_done() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;
    let runner = JobRunner::start(context(Arc::clone(&db), Arc::new(KeywordEmbedder)), single_worker());

    let ticket = runner.trigger(topic_id).await.unwrap();
    assert!(!ticket.coalesced);
    assert_eq!(ticket.topic_id, topic_id);

    let status = runner.wait(ticket.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Done);
    assert_eq!(status.cluster_count, Some(2));
    assert!(status.error.is_none());
    assert!(status.started_at.is_some());
    assert!(status.finished_at.is_some());
    runner.shutdown().await;

    assert_eq!(db.get_clusters(topic_id).await.unwrap().len(), 2);
    let runs = db.recent_job_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].job_id, ticket.job_id);
    assert_eq!(runs[0].state, JobState::Done);
}

#[tokio::test]
async fn failing_job_is_recorded_as_failed() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;
    let runner = JobRunner::start(context(Arc::clone(&db), Arc::new(FailingEmbedder)), single_worker());

    let ticket = runner.trigger(topic_id).await.unwrap();
    let status = runner.wait(ticket.job_id).await.unwrap();
    runner.shutdown().await;

    assert_eq!(status.state, JobState::Failed);
    let error = status.error.unwrap();
    assert!(error.contains("model files missing"), "got {error}");
    assert!(db.get_clusters(topic_id).await.unwrap().is_empty());

    let runs = db.recent_job_runs(10).await.unwrap();
    assert_eq!(runs[0].state, JobState::Failed);
    assert!(runs[0].error.is_some());
}

#[tokio::test]
async fn one_failing_topic_does_not_block_another() {
    let db = memory_db();
    let good = seeded_topic(&db, "Downtown").await;
    let empty = db.insert_topic("Silent").await.unwrap();
    let runner = JobRunner::start(context(Arc::clone(&db), Arc::new(KeywordEmbedder)), single_worker());

    let failing = runner.trigger(empty).await.unwrap();
    let working = runner.trigger(good).await.unwrap();

    assert_eq!(runner.wait(failing.job_id).await.unwrap().state, JobState::Failed);
    assert_eq!(runner.wait(working.job_id).await.unwrap().state, JobState::Done);
    runner.shutdown().await;
}

#[tokio::test]
async fn unknown_job_has_no_status() {
    let runner = JobRunner::start(context(memory_db(), Arc::new(KeywordEmbedder)), single_worker());
    assert!(runner.status(999).await.is_none());
    assert!(runner.wait(999).await.is_none());
    runner.shutdown().await;
}

#[tokio::test]
async fn queued_duplicate_triggers_coalesce() {
    let db = memory_db();
    let first = seeded_topic(&db, "Downtown").await;
    let second = seeded_topic(&db, "Harbour").await;
    let gate = Arc::new(Semaphore::new(0));
    let embedder = GatedEmbedder {
        gate: Arc::clone(&gate),
    };
    let runner = JobRunner::start(context(Arc::clone(&db), Arc::new(embedder)), single_worker());

    // The only worker picks up the first topic and blocks on the gate, so the
    // second topic's job stays queued.
    let busy = runner.trigger(first).await.unwrap();
    let queued = runner.trigger(second).await.unwrap();
    let again = runner.trigger(second).await.unwrap();

    assert!(!queued.coalesced);
    assert!(again.coalesced);
    assert_eq!(again.job_id, queued.job_id);
    assert_ne!(busy.job_id, queued.job_id);

    gate.add_permits(10);
    assert_eq!(runner.wait(busy.job_id).await.unwrap().state, JobState::Done);
    assert_eq!(runner.wait(queued.job_id).await.unwrap().state, JobState::Done);
    runner.shutdown().await;

    // Two triggers for the second topic, one run
    assert_eq!(db.recent_job_runs(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn running_job_does_not_absorb_new_triggers() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;
    let gate = Arc::new(Semaphore::new(0));
    let embedder = GatedEmbedder {
        gate: Arc::clone(&gate),
    };
    let runner = JobRunner::start(context(Arc::clone(&db), Arc::new(embedder)), single_worker());

    let running = runner.trigger(topic_id).await.unwrap();
    wait_for_state(&runner, running.job_id, JobState::Running).await;

    let next = runner.trigger(topic_id).await.unwrap();
    assert!(!next.coalesced);
    assert_ne!(next.job_id, running.job_id);

    gate.add_permits(10);
    assert_eq!(runner.wait(next.job_id).await.unwrap().state, JobState::Done);
    runner.shutdown().await;
}

#[tokio::test]
async fn full_queue_rejects_triggers() {
    let db = memory_db();
    let topics = [
        seeded_topic(&db, "One").await,
        seeded_topic(&db, "Two").await,
        seeded_topic(&db, "Three").await,
    ];
    let gate = Arc::new(Semaphore::new(0));
    let embedder = GatedEmbedder {
        gate: Arc::clone(&gate),
    };
    let config = RunnerConfig {
        worker_count: 1,
        queue_capacity: 1,
    };
    let runner = JobRunner::start(context(Arc::clone(&db), Arc::new(embedder)), config);

    let running = runner.trigger(topics[0]).await.unwrap();
    wait_for_state(&runner, running.job_id, JobState::Running).await;

    let queued = runner.trigger(topics[1]).await.unwrap();
    assert_eq!(runner.trigger(topics[2]).await, Err(TriggerError::QueueFull));

    gate.add_permits(10);
    runner.wait(queued.job_id).await.unwrap();
    runner.shutdown().await;
}

#[tokio::test]
async fn trigger_after_shutdown_is_rejected() {
    let db = memory_db();
    let topic_id = seeded_topic(&db, "Downtown").await;
    let runner = JobRunner::start(context(db, Arc::new(KeywordEmbedder)), single_worker());

    runner.shutdown().await;
    assert_eq!(runner.trigger(topic_id).await, Err(TriggerError::Stopped));
}

#[tokio::test]
async fn shutdown_drains_queued_jobs() {
    let db = memory_db();
    let first = seeded_topic(&db, "Downtown").await;
    let second = seeded_topic(&db, "Harbour").await;
    let runner = JobRunner::start(context(Arc::clone(&db), Arc::new(KeywordEmbedder)), single_worker());

    let a = runner.trigger(first).await.unwrap();
    let b = runner.trigger(second).await.unwrap();
    runner.shutdown().await;

    assert_eq!(runner.status(a.job_id).await.unwrap().state, JobState::Done);
    assert_eq!(runner.status(b.job_id).await.unwrap().state, JobState::Done);
}

async fn wait_for_state(runner: &JobRunner, job_id: u64, state: JobState) {
    for _ in 0..400 {
        if runner.status(job_id).await.map(|s| s.state) == Some(state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached {state}");
}
