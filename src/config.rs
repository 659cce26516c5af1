use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::clustering::{ClusteringConfig, LeaderStrategyKind};
use crate::jobs::RunnerConfig;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Every value
/// has a default; a variable that is set but unparseable is an error naming
/// the variable rather than a silent fallback.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// Root directory for downloaded models
    pub model_dir: PathBuf,
    pub runner: RunnerConfig,
    /// Upper bound on one embedding call
    pub embed_timeout: Duration,
    pub clustering: ClusteringConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let model_dir = env::var("QUORUM_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::embedding::download::default_model_dir());

        let runner_defaults = RunnerConfig::default();
        let runner = RunnerConfig {
            worker_count: parse_var("QUORUM_WORKERS", runner_defaults.worker_count)?,
            queue_capacity: parse_var("QUORUM_QUEUE_CAPACITY", runner_defaults.queue_capacity)?,
        };
        if runner.worker_count == 0 {
            anyhow::bail!("QUORUM_WORKERS must be at least 1");
        }
        if runner.queue_capacity == 0 {
            anyhow::bail!("QUORUM_QUEUE_CAPACITY must be at least 1");
        }

        let d = ClusteringConfig::default();
        let clustering = ClusteringConfig {
            merge_threshold: parse_unit_var("QUORUM_MERGE_THRESHOLD", d.merge_threshold)?,
            split_floor: parse_unit_var("QUORUM_SPLIT_FLOOR", d.split_floor)?,
            noise_similarity: parse_unit_var("QUORUM_NOISE_SIMILARITY", d.noise_similarity)?,
            leader_weight_share: parse_unit_var("QUORUM_LEADER_WEIGHT_SHARE", d.leader_weight_share)?,
            kmeans_seed: parse_var("QUORUM_KMEANS_SEED", d.kmeans_seed)?,
            leader_strategy: parse_var::<LeaderStrategyKind>("QUORUM_LEADER_STRATEGY", d.leader_strategy)?,
            ..d
        };

        Ok(Self {
            db_path: env::var("QUORUM_DB_PATH").unwrap_or_else(|_| "./quorum.db".to_string()),
            model_dir,
            runner,
            embed_timeout: Duration::from_secs(parse_var("QUORUM_EMBED_TIMEOUT_SECS", 120u64)?),
            clustering,
        })
    }
}

/// Parse an optional env var, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid value for {name}: '{raw}'"))
}

/// Like `parse_var`, for values that must lie in 0.0..=1.0.
fn parse_unit_var(name: &str, default: f64) -> Result<f64> {
    let value: f64 = parse_var(name, default)?;
    check_unit(name, value)
}

fn check_unit(name: &str, value: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{name} must be between 0.0 and 1.0, got {value}");
    }
    Ok(value)
}
