// Database trait: async interface for everything the job runner and CLI
// need from storage.
//
// Methods are async so the sync rusqlite backend (behind a tokio Mutex) can
// sit behind the same interface a native async backend would use. The trait
// mirrors the free functions in queries.rs.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{JobRun, Opinion, StoredCluster, Topic};
use crate::clustering::Cluster;

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Topics and opinions ---

    async fn insert_topic(&self, title: &str) -> Result<i64>;

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>>;

    async fn list_topics(&self) -> Result<Vec<Topic>>;

    /// Store an opinion and return its ID. Rejects empty text and weights
    /// outside 1..=10.
    async fn insert_opinion(&self, topic_id: i64, author: &str, text: &str, weight: i64) -> Result<i64>;

    /// All opinions on a topic, in submission order.
    async fn fetch_opinions(&self, topic_id: i64) -> Result<Vec<Opinion>>;

    async fn opinion_count(&self, topic_id: i64) -> Result<i64>;

    // --- Clusters ---

    /// Atomically replace a topic's clusters. On error the previous set is
    /// left untouched.
    async fn replace_clusters(&self, topic_id: i64, clusters: &[Cluster]) -> Result<Vec<i64>>;

    async fn get_clusters(&self, topic_id: i64) -> Result<Vec<StoredCluster>>;

    // --- Job runs ---

    async fn record_job_run(&self, run: &JobRun) -> Result<i64>;

    async fn recent_job_runs(&self, limit: u32) -> Result<Vec<JobRun>>;
}
