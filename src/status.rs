// System status display: DB stats, topics, model presence, recent jobs.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;
use crate::embedding::download::embedding_files_present;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_display_path: &str, model_dir: &Path) -> Result<()> {
    if !Path::new(db_display_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `quorum init` to set up the database.");
        return Ok(());
    }

    let file_size = std::fs::metadata(db_display_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_display_path, file_size);

    if embedding_files_present(model_dir) {
        println!("Embedding model: present in {}", model_dir.display());
    } else {
        println!("Embedding model: not downloaded");
        println!("  Run `quorum download-model` to fetch it");
    }

    let topics = db.list_topics().await?;
    if topics.is_empty() {
        println!("Topics: none yet");
        println!("  Run `quorum add-topic \"<title>\"` to create one");
    } else {
        println!("Topics: {}", topics.len());
        for topic in &topics {
            let opinions = db.opinion_count(topic.id).await?;
            let clusters = db.get_clusters(topic.id).await?.len();
            println!(
                "  [{}] {}: {} opinions, {} clusters",
                topic.id, topic.title, opinions, clusters
            );
        }
    }

    let runs = db.recent_job_runs(5).await?;
    crate::output::terminal::display_job_runs(&runs);

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
