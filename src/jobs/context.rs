// Everything a worker needs to turn a topic's opinions into stored clusters.
//
// One context is shared by all workers. The steps run in a fixed order and
// clusters are only written at the very end, so any failure leaves the
// topic's previous clusters in place.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::JobError;
use crate::clustering::normalize::normalize_texts;
use crate::clustering::quality::QualityReport;
use crate::clustering::OpinionClusterer;
use crate::db::Database;
use crate::embedding::EmbeddingProvider;
use crate::headings::HeadingRewriter;

/// Shared collaborators for clustering jobs.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: Arc<dyn Database>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub rewriter: Arc<dyn HeadingRewriter>,
    pub clusterer: Arc<OpinionClusterer>,
    pub embed_timeout: Duration,
}

/// What a successful job produced.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub opinion_count: usize,
    pub cluster_count: usize,
    pub cluster_ids: Vec<i64>,
    /// Quality of the winning density attempt (absent for a single opinion).
    pub quality: Option<QualityReport>,
}

impl WorkerContext {
    /// Cluster one topic and replace its stored clusters.
    pub async fn process(&self, topic_id: i64) -> Result<JobOutcome, JobError> {
        let opinions = self
            .db
            .fetch_opinions(topic_id)
            .await
            .map_err(|e| JobError::Persistence(format!("{e:#}")))?;
        if opinions.is_empty() {
            return Err(JobError::EmptyTopic { topic_id });
        }

        let texts: Vec<String> = opinions.iter().map(|o| o.text.clone()).collect();
        let texts = normalize_texts(&texts);

        let embeddings = match tokio::time::timeout(self.embed_timeout, self.embedder.embed(&texts)).await {
            Ok(Ok(vectors)) => vectors,
            Ok(Err(e)) => return Err(JobError::EmbeddingUnavailable(format!("{e:#}"))),
            Err(_) => {
                return Err(JobError::EmbeddingUnavailable(format!(
                    "timed out after {}s",
                    self.embed_timeout.as_secs()
                )))
            }
        };
        check_embeddings(opinions.len(), &embeddings)?;
        debug!(topic_id, count = embeddings.len(), "Embedded opinions");

        let clusterer = Arc::clone(&self.clusterer);
        let opinion_count = opinions.len();
        let run = tokio::task::spawn_blocking(move || clusterer.run(&opinions, &embeddings))
            .await
            .map_err(|e| JobError::Clustering(format!("clustering task panicked: {e}")))?
            .map_err(|e| JobError::Clustering(format!("{e:#}")))?;

        let quality = run.attempt.as_ref().map(|a| a.quality);
        let mut clusters = run.clusters;

        for cluster in &mut clusters {
            match self.rewriter.summarize(&cluster.leader().text).await {
                Ok(heading) if !heading.trim().is_empty() => cluster.set_heading(heading),
                Ok(_) => warn!(topic_id, leader = cluster.leader().id, "Empty heading, keeping leader text"),
                Err(e) => warn!(
                    topic_id,
                    leader = cluster.leader().id,
                    error = %e,
                    "Heading rewrite failed, keeping leader text"
                ),
            }
        }

        let cluster_ids = self
            .db
            .replace_clusters(topic_id, &clusters)
            .await
            .map_err(|e| JobError::Persistence(format!("{e:#}")))?;

        Ok(JobOutcome {
            opinion_count,
            cluster_count: clusters.len(),
            cluster_ids,
            quality,
        })
    }
}

fn check_embeddings(expected: usize, embeddings: &[Vec<f64>]) -> Result<(), JobError> {
    if embeddings.len() != expected {
        return Err(JobError::EmbeddingMismatch(format!(
            "expected {expected} vectors, got {}",
            embeddings.len()
        )));
    }
    let dim = embeddings.first().map_or(0, Vec::len);
    if dim == 0 {
        return Err(JobError::EmbeddingMismatch("vectors have no dimensions".to_string()));
    }
    if let Some(bad) = embeddings.iter().find(|v| v.len() != dim) {
        return Err(JobError::EmbeddingMismatch(format!(
            "expected dimension {dim}, got {}",
            bad.len()
        )));
    }
    Ok(())
}
