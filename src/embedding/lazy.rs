// LazyEmbedder: loads the ONNX model on first use, then keeps it.
//
// Loading takes a couple of seconds and ~90MB of memory, so the CLI commands
// that never embed shouldn't pay for it. Concurrent first calls wait on the
// cell's init lock; only one load runs. A failed load leaves the cell empty
// and the next call retries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

use super::download::embedding_model_dir;
use super::onnx::SentenceEmbedder;
use super::traits::EmbeddingProvider;

pub struct LazyEmbedder {
    model_dir: PathBuf,
    embedder: OnceCell<SentenceEmbedder>,
}

impl LazyEmbedder {
    /// `base_dir` is the model directory root (see `default_model_dir`).
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            model_dir: embedding_model_dir(&base_dir),
            embedder: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.embedder.initialized()
    }

    async fn get(&self) -> Result<&SentenceEmbedder> {
        self.embedder
            .get_or_try_init(|| async {
                let dir = self.model_dir.clone();
                let embedder = tokio::task::spawn_blocking(move || SentenceEmbedder::load(&dir))
                    .await
                    .context("Model loading task panicked")??;
                info!(dir = %self.model_dir.display(), "Embedding model loaded");
                Ok::<_, anyhow::Error>(embedder)
            })
            .await
    }
}

#[async_trait]
impl EmbeddingProvider for LazyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        self.get().await?.embed(texts).await
    }
}
