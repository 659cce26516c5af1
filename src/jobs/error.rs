// Job failure taxonomy.
//
// Every way a clustering job can fail maps to one variant. The runner records
// the Display text on the job's status and in the job_runs table.

use thiserror::Error;

/// Why a clustering job failed. None of these leave partial clusters behind.
#[derive(Debug, Error)]
pub enum JobError {
    /// The topic has no opinions to cluster.
    #[error("Topic {topic_id} has no opinions")]
    EmptyTopic { topic_id: i64 },

    /// The embedding provider errored or timed out.
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The provider returned the wrong number of vectors or ragged dimensions.
    #[error("Embedding mismatch: {0}")]
    EmbeddingMismatch(String),

    /// The clustering engine failed or its task panicked.
    #[error("Clustering failed: {0}")]
    Clustering(String),

    /// Reading opinions or writing clusters failed.
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

/// Why a trigger was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Job queue is full")]
    QueueFull,

    #[error("Job runner has shut down")]
    Stopped,
}
