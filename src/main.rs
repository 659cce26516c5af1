use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use quorum::clustering::OpinionClusterer;
use quorum::config::Config;
use quorum::db::models::NewOpinion;
use quorum::db::Database;
use quorum::embedding::download::embedding_files_present;
use quorum::embedding::LazyEmbedder;
use quorum::headings::LeaderTextHeading;
use quorum::jobs::{JobRunner, WorkerContext};
use quorum::output::terminal;

/// Quorum: group a topic's opinions into a few representative positions.
///
/// Opinions are embedded with a local sentence model, clustered by density,
/// and each cluster is headed by the opinion that best speaks for it.
#[derive(Parser)]
#[command(name = "quorum", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Download the sentence embedding model (~90 MB)
    DownloadModel,

    /// Create a topic to collect opinions on
    AddTopic {
        /// Topic title
        title: String,
    },

    /// Import opinions from a JSON file ([{"author", "text", "weight"}, ...])
    Import {
        /// Topic to add the opinions to
        topic_id: i64,

        /// Path to the JSON file
        file: PathBuf,
    },

    /// Cluster a topic's opinions and store the result
    Cluster {
        /// Topic to cluster
        topic_id: i64,
    },

    /// Show a topic's clusters
    Report {
        /// Topic to report on
        topic_id: i64,

        /// Explain why opinions were grouped and why each heading was chosen
        #[arg(long)]
        explain: bool,

        /// Print the clusters as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show system status (DB stats, topics, recent jobs)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quorum=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing Quorum database...");
            let db = quorum::db::initialize_sqlite(&config.db_path)?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            if !embedding_files_present(&config.model_dir) {
                println!("\nNext step: download the embedding model");
                println!("  quorum download-model");
            }
        }

        Commands::DownloadModel => {
            println!("Downloading model to {}", config.model_dir.display());
            quorum::embedding::download::download_model(&config.model_dir).await?;
            println!("\n{}", "Model ready.".green());
        }

        Commands::AddTopic { title } => {
            let db = quorum::db::open_sqlite(&config.db_path)?;
            let topic_id = db.insert_topic(&title).await?;
            println!("Created topic {topic_id}: {}", title.trim());
        }

        Commands::Import { topic_id, file } => {
            let db = quorum::db::open_sqlite(&config.db_path)?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let opinions: Vec<NewOpinion> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of opinions", file.display()))?;

            let mut imported = 0usize;
            let mut skipped = 0usize;
            for opinion in &opinions {
                match db
                    .insert_opinion(topic_id, &opinion.author, &opinion.text, opinion.weight)
                    .await
                {
                    Ok(_) => imported += 1,
                    Err(e) => {
                        warn!(author = %opinion.author, error = %e, "Skipping opinion");
                        skipped += 1;
                    }
                }
            }
            println!("Imported {imported} opinions into topic {topic_id} ({skipped} skipped)");
        }

        Commands::Cluster { topic_id } => {
            let db = quorum::db::open_sqlite(&config.db_path)?;
            let Some(topic) = db.get_topic(topic_id).await? else {
                anyhow::bail!("Topic {topic_id} not found");
            };

            let context = WorkerContext {
                db: Arc::clone(&db),
                embedder: Arc::new(LazyEmbedder::new(config.model_dir.clone())),
                rewriter: Arc::new(LeaderTextHeading),
                clusterer: Arc::new(OpinionClusterer::new(config.clustering.clone())),
                embed_timeout: config.embed_timeout,
            };
            let runner = JobRunner::start(context, config.runner);

            let ticket = runner.trigger(topic_id).await?;
            terminal::display_ticket(&ticket);

            let status = runner.wait(ticket.job_id).await;
            runner.shutdown().await;

            match status {
                Some(status) => {
                    terminal::display_job_status(&status);
                    if status.error.is_none() {
                        let clusters = db.get_clusters(topic_id).await?;
                        terminal::display_clusters(&topic, &clusters, false);
                    }
                }
                None => println!("Job {} finished without a status", ticket.job_id),
            }
        }

        Commands::Report {
            topic_id,
            explain,
            json,
        } => {
            let db = quorum::db::open_sqlite(&config.db_path)?;
            let Some(topic) = db.get_topic(topic_id).await? else {
                anyhow::bail!("Topic {topic_id} not found");
            };
            let clusters = db.get_clusters(topic_id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&clusters)?);
            } else {
                terminal::display_clusters(&topic, &clusters, explain);
            }
        }

        Commands::Status => {
            if !std::path::Path::new(&config.db_path).exists() {
                println!("Database: not initialized");
                println!("\nRun `quorum init` to set up the database.");
                return Ok(());
            }
            let db = quorum::db::open_sqlite(&config.db_path)?;
            quorum::status::show(&db, &config.db_path, &config.model_dir).await?;
        }
    }

    Ok(())
}
