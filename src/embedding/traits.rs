// Embedding provider trait: the swap-ready abstraction.
//
// The default implementation runs a local ONNX sentence transformer. Tests
// substitute deterministic fakes.

use anyhow::Result;
use async_trait::async_trait;

/// Trait for turning texts into dense vectors. Async because real providers
/// either call out over HTTP or push CPU work onto a blocking thread.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed texts, returning one vector per text in the same order. Every
    /// vector has the same dimension.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}
