// Data models: Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use serde::{Deserialize, Serialize};

/// One participant statement on a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    /// Unique within a topic.
    pub id: i64,
    pub author: String,
    pub text: String,
    /// Self-reported importance, 1..=10 at submission.
    pub weight: i64,
}

/// An opinion as submitted, before it has an ID. This is also the shape of
/// each entry in an import file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOpinion {
    pub author: String,
    pub text: String,
    #[serde(default = "default_weight")]
    pub weight: i64,
}

fn default_weight() -> i64 {
    5
}

/// A topic opinions are submitted against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    pub created_at: String,
}

/// A persisted cluster with its members, leader first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCluster {
    pub id: i64,
    pub topic_id: i64,
    pub heading: String,
    pub leader_id: i64,
    pub leader_author: String,
    /// 0-based rank; 0 is the largest cluster.
    pub position: i64,
    pub members: Vec<Opinion>,
}

/// Lifecycle of a clustering job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "done" => Some(JobState::Done),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    /// Done and Failed never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded outcome of one clustering job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: u64,
    pub topic_id: i64,
    pub state: JobState,
    pub error: Option<String>,
    pub cluster_count: Option<usize>,
    pub started_at: String,
    pub finished_at: Option<String>,
}
