// Database queries: CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{JobRun, JobState, Opinion, StoredCluster, Topic};
use crate::clustering::Cluster;

// --- Topics ---

/// Create a topic and return its ID.
pub fn insert_topic(conn: &Connection, title: &str) -> Result<i64> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Topic title must not be empty");
    }
    conn.execute("INSERT INTO topics (title) VALUES (?1)", params![title])?;
    Ok(conn.last_insert_rowid())
}

pub fn get_topic(conn: &Connection, topic_id: i64) -> Result<Option<Topic>> {
    let topic = conn
        .query_row(
            "SELECT id, title, created_at FROM topics WHERE id = ?1",
            params![topic_id],
            |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(topic)
}

pub fn list_topics(conn: &Connection) -> Result<Vec<Topic>> {
    let mut stmt = conn.prepare("SELECT id, title, created_at FROM topics ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Topic {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: row.get(2)?,
        })
    })?;

    let mut topics = Vec::new();
    for row in rows {
        topics.push(row?);
    }
    Ok(topics)
}

// --- Opinions ---

/// Store an opinion and return its ID.
///
/// Text must be non-empty after trimming; weight must be 1..=10.
pub fn insert_opinion(
    conn: &Connection,
    topic_id: i64,
    author: &str,
    text: &str,
    weight: i64,
) -> Result<i64> {
    if text.trim().is_empty() {
        bail!("Opinion text must not be empty");
    }
    if !(1..=10).contains(&weight) {
        bail!("Opinion weight must be between 1 and 10, got {weight}");
    }
    if get_topic(conn, topic_id)?.is_none() {
        bail!("Topic {topic_id} does not exist");
    }

    conn.execute(
        "INSERT INTO opinions (topic_id, author, text, weight) VALUES (?1, ?2, ?3, ?4)",
        params![topic_id, author, text, weight],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All opinions on a topic, in submission order.
pub fn fetch_opinions(conn: &Connection, topic_id: i64) -> Result<Vec<Opinion>> {
    let mut stmt = conn.prepare(
        "SELECT id, author, text, weight FROM opinions WHERE topic_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![topic_id], |row| {
        Ok(Opinion {
            id: row.get(0)?,
            author: row.get(1)?,
            text: row.get(2)?,
            weight: row.get(3)?,
        })
    })?;

    let mut opinions = Vec::new();
    for row in rows {
        opinions.push(row?);
    }
    Ok(opinions)
}

pub fn opinion_count(conn: &Connection, topic_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM opinions WHERE topic_id = ?1",
        params![topic_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// --- Clusters ---

/// Replace a topic's clusters with a new set in a single transaction.
///
/// Either every old cluster is gone and every new one is stored, or nothing
/// changes. Returns the new cluster IDs in position order.
pub fn replace_clusters(conn: &mut Connection, topic_id: i64, clusters: &[Cluster]) -> Result<Vec<i64>> {
    let tx = conn
        .transaction()
        .context("Failed to start cluster replacement")?;

    tx.execute(
        "DELETE FROM cluster_members
         WHERE cluster_id IN (SELECT id FROM clusters WHERE topic_id = ?1)",
        params![topic_id],
    )?;
    tx.execute("DELETE FROM clusters WHERE topic_id = ?1", params![topic_id])?;

    let mut ids = Vec::with_capacity(clusters.len());
    {
        let mut insert_cluster = tx.prepare(
            "INSERT INTO clusters (topic_id, position, heading, leader_opinion_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut insert_member = tx.prepare(
            "INSERT INTO cluster_members (cluster_id, opinion_id, position) VALUES (?1, ?2, ?3)",
        )?;

        for (position, cluster) in clusters.iter().enumerate() {
            let cluster_id = insert_cluster.insert(params![
                topic_id,
                position as i64,
                cluster.heading(),
                cluster.leader().id
            ])?;
            for (member_pos, member) in cluster.members().iter().enumerate() {
                insert_member.execute(params![cluster_id, member.id, member_pos as i64])?;
            }
            ids.push(cluster_id);
        }
    }

    tx.commit().context("Failed to commit cluster replacement")?;
    Ok(ids)
}

/// Stored clusters for a topic, largest first, members leader first.
pub fn get_clusters(conn: &Connection, topic_id: i64) -> Result<Vec<StoredCluster>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.position, c.heading, c.leader_opinion_id, o.author
         FROM clusters c
         JOIN opinions o ON o.id = c.leader_opinion_id
         WHERE c.topic_id = ?1
         ORDER BY c.position",
    )?;
    let rows = stmt.query_map(params![topic_id], |row| {
        Ok(StoredCluster {
            id: row.get(0)?,
            topic_id,
            position: row.get(1)?,
            heading: row.get(2)?,
            leader_id: row.get(3)?,
            leader_author: row.get(4)?,
            members: Vec::new(),
        })
    })?;

    let mut clusters = Vec::new();
    for row in rows {
        clusters.push(row?);
    }

    let mut member_stmt = conn.prepare(
        "SELECT o.id, o.author, o.text, o.weight
         FROM cluster_members m
         JOIN opinions o ON o.id = m.opinion_id
         WHERE m.cluster_id = ?1
         ORDER BY m.position",
    )?;
    for cluster in &mut clusters {
        let members = member_stmt.query_map(params![cluster.id], |row| {
            Ok(Opinion {
                id: row.get(0)?,
                author: row.get(1)?,
                text: row.get(2)?,
                weight: row.get(3)?,
            })
        })?;
        for member in members {
            cluster.members.push(member?);
        }
    }

    Ok(clusters)
}

// --- Job runs ---

/// Record the outcome of a clustering job and return the row ID.
pub fn record_job_run(conn: &Connection, run: &JobRun) -> Result<i64> {
    conn.execute(
        "INSERT INTO job_runs (job_id, topic_id, state, error, cluster_count, started_at, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run.job_id as i64,
            run.topic_id,
            run.state.as_str(),
            run.error,
            run.cluster_count.map(|c| c as i64),
            run.started_at,
            run.finished_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent job runs first.
pub fn recent_job_runs(conn: &Connection, limit: u32) -> Result<Vec<JobRun>> {
    let mut stmt = conn.prepare(
        "SELECT job_id, topic_id, state, error, cluster_count, started_at, finished_at
         FROM job_runs
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        let state: String = row.get(2)?;
        let cluster_count: Option<i64> = row.get(4)?;
        let job_id: i64 = row.get(0)?;
        Ok(JobRun {
            job_id: job_id as u64,
            topic_id: row.get(1)?,
            // Unknown states only come from hand-edited rows.
            state: JobState::parse(&state).unwrap_or(JobState::Failed),
            error: row.get(3)?,
            cluster_count: cluster_count.map(|c| c as usize),
            started_at: row.get(5)?,
            finished_at: row.get(6)?,
        })
    })?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(row?);
    }
    Ok(runs)
}
