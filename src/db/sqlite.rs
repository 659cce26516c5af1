// SqliteDatabase: rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{JobRun, Opinion, StoredCluster, Topic};
use super::traits::Database;
use crate::clustering::Cluster;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn insert_topic(&self, title: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_topic(&conn, title)
    }

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>> {
        let conn = self.conn.lock().await;
        super::queries::get_topic(&conn, topic_id)
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let conn = self.conn.lock().await;
        super::queries::list_topics(&conn)
    }

    async fn insert_opinion(&self, topic_id: i64, author: &str, text: &str, weight: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_opinion(&conn, topic_id, author, text, weight)
    }

    async fn fetch_opinions(&self, topic_id: i64) -> Result<Vec<Opinion>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_opinions(&conn, topic_id)
    }

    async fn opinion_count(&self, topic_id: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::opinion_count(&conn, topic_id)
    }

    async fn replace_clusters(&self, topic_id: i64, clusters: &[Cluster]) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock().await;
        super::queries::replace_clusters(&mut conn, topic_id, clusters)
    }

    async fn get_clusters(&self, topic_id: i64) -> Result<Vec<StoredCluster>> {
        let conn = self.conn.lock().await;
        super::queries::get_clusters(&conn, topic_id)
    }

    async fn record_job_run(&self, run: &JobRun) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::record_job_run(&conn, run)
    }

    async fn recent_job_runs(&self, limit: u32) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().await;
        super::queries::recent_job_runs(&conn, limit)
    }
}
