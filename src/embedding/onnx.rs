// Local sentence embeddings with all-MiniLM-L6-v2 over ONNX Runtime.
//
// Opinions are short, so one forward pass per batch of 32 texts keeps padding
// waste low. Mean pooling over the attention mask matches how the model was
// trained; vectors come back unnormalised (the clustering engine normalises).

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use super::traits::EmbeddingProvider;

/// Embedding dimension for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Texts per forward pass.
pub const BATCH_SIZE: usize = 32;

/// Sentence embedder using a local ONNX model.
///
/// The session sits behind `Arc<Mutex<_>>` so inference is serialised and the
/// handle can move into `spawn_blocking`.
pub struct SentenceEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl SentenceEmbedder {
    /// Load the model and tokenizer from `model_dir`.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in the directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            anyhow::bail!(
                "Embedding model not found: {}\nRun `quorum download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Embedding tokenizer not found: {}\nRun `quorum download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load embedding model from {}", model_path.display()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load embedding tokenizer: {}", e))?;

        debug!(dir = %model_dir.display(), "Loaded sentence embedding model");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for SentenceEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut vectors = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(BATCH_SIZE) {
                vectors.extend(embed_sync(&session, &tokenizer, chunk)?);
            }
            Ok(vectors)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Tokenize, run inference, and mean-pool one batch.
fn embed_sync(session: &Mutex<Session>, tokenizer: &Tokenizer, texts: &[String]) -> Result<Vec<Vec<f64>>> {
    let encodings: Vec<_> = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

    if max_len == 0 {
        return Ok(vec![vec![0.0; EMBEDDING_DIM]; batch_size]);
    }

    // BERT inputs, right-padded with 0 (the pad token id)
    let mut input_ids: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for enc in &encodings {
        let ids = enc.get_ids();
        let pad_len = max_len - ids.len();

        input_ids.extend(ids.iter().map(|&id| id as i64));
        attention_mask.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
        input_ids.extend(std::iter::repeat_n(0i64, pad_len));
        attention_mask.extend(std::iter::repeat_n(0i64, pad_len));
    }
    let token_type_ids = vec![0i64; batch_size * max_len];

    let shape = [batch_size as i64, max_len as i64];
    let input_ids_tensor =
        Tensor::from_array((shape, input_ids)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
        .context("Failed to create token_type_ids tensor")?;

    // last_hidden_state: [batch, seq_len, 384]
    let hidden = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("Embedding ONNX inference failed")?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract embedding output tensor")?;

        data.to_vec()
    };

    let embeddings = mean_pool(&hidden, &attention_mask, batch_size, max_len, EMBEDDING_DIM);
    debug!(batch_size, dim = EMBEDDING_DIM, "Computed sentence embeddings");
    Ok(embeddings)
}

/// Average token vectors per text, counting only positions where the
/// attention mask is set. A text with an all-zero mask pools to zeros.
fn mean_pool(hidden: &[f32], mask: &[i64], batch: usize, seq_len: usize, dim: usize) -> Vec<Vec<f64>> {
    let mut pooled = Vec::with_capacity(batch);
    for i in 0..batch {
        let mut sum = vec![0.0_f64; dim];
        let mut count = 0.0_f64;

        for j in 0..seq_len {
            let m = mask[i * seq_len + j] as f64;
            if m > 0.0 {
                count += m;
                let offset = (i * seq_len + j) * dim;
                for (k, s) in sum.iter_mut().enumerate() {
                    *s += hidden[offset + k] as f64 * m;
                }
            }
        }

        if count > 0.0 {
            for s in &mut sum {
                *s /= count;
            }
        }
        pooled.push(sum);
    }
    pooled
}
