//! Sentence embedding via ONNX inference.
//!
//! Runs the all-MiniLM-L6-v2 sentence-transformer exported to ONNX:
//! tokenize, forward pass, attention-masked mean pooling over the token
//! embeddings, then L2 normalization. Output is a 384-dimension unit
//! vector suitable for cosine comparison.

use std::path::Path;
use std::sync::Mutex;

use ndarray::ArrayView2;
use tracing::info;

use super::{EmbeddingError, TextEmbedder};

/// Output dimension of all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Configuration for the MiniLM embedder.
#[derive(Debug, Clone)]
pub struct MiniLmConfig {
    /// Path to the ONNX model file.
    pub model_path: String,
    /// Path to the tokenizer.json file.
    pub tokenizer_path: String,
    /// Maximum sequence length (tokens).
    pub max_length: usize,
}

impl Default for MiniLmConfig {
    fn default() -> Self {
        Self {
            model_path: "models/all-minilm-l6-v2.onnx".to_string(),
            tokenizer_path: "models/tokenizer.json".to_string(),
            max_length: 256,
        }
    }
}

/// ONNX-backed sentence embedder.
///
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex and `embed` takes `&self`; one embedder is shared across request
/// handlers as an `Arc<dyn TextEmbedder>`. Inference runs are serialized,
/// callers are not otherwise coordinated.
pub struct MiniLmEmbedder {
    session: Mutex<ort::session::Session>,
    tokenizer: tokenizers::Tokenizer,
    config: MiniLmConfig,
}

impl MiniLmEmbedder {
    /// Loads the model and tokenizer from the configured paths.
    ///
    /// Returns an error if either file is missing or the session cannot be
    /// built; the caller is expected to treat that as fatal at startup.
    pub fn new(config: MiniLmConfig) -> Result<Self, EmbeddingError> {
        use ort::session::{builder::GraphOptimizationLevel, Session};

        if !Path::new(&config.model_path).exists() {
            return Err(EmbeddingError::ModelNotFound(config.model_path.clone()));
        }
        if !Path::new(&config.tokenizer_path).exists() {
            return Err(EmbeddingError::TokenizerNotFound(
                config.tokenizer_path.clone(),
            ));
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(&config.model_path)?;

        let tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)?;

        info!(model = %config.model_path, "Loaded MiniLM embedder");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            config,
        })
    }

    /// Loads the embedder from default paths.
    pub fn load_default() -> Result<Self, EmbeddingError> {
        Self::new(MiniLmConfig::default())
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &MiniLmConfig {
        &self.config
    }

    fn run_inference(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        use ort::value::Tensor;

        // Tokenize input
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();

        let seq_len = input_ids.len().min(self.config.max_length);
        let input_ids = input_ids[..seq_len].to_vec();
        let attention_mask = attention_mask[..seq_len].to_vec();
        let token_type_ids = vec![0i64; seq_len];

        // Create ONNX tensors with shape [1, seq_len]
        let input_ids_tensor = Tensor::from_array(([1, seq_len], input_ids.into_boxed_slice()))?;
        let attention_mask_tensor = Tensor::from_array((
            [1, seq_len],
            attention_mask.clone().into_boxed_slice(),
        ))?;
        let token_type_ids_tensor =
            Tensor::from_array(([1, seq_len], token_type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Inference("embedder session lock poisoned".to_string()))?;

        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor
        ])?;

        // Extract per-token embeddings: shape [1, seq_len, EMBEDDING_DIM]
        let hidden = outputs["last_hidden_state"]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                EmbeddingError::Inference(format!("Failed to extract hidden states: {}", e))
            })?;

        let shape = hidden.0;
        let data = hidden.1;

        let dims: Vec<_> = shape.iter().collect();
        if dims.len() != 3 || *dims[0] != 1 || *dims[2] != EMBEDDING_DIM as i64 {
            return Err(EmbeddingError::Inference(format!(
                "Unexpected output shape: {:?}",
                dims
            )));
        }
        let tokens = *dims[1] as usize;

        mean_pool(data, &attention_mask, tokens, EMBEDDING_DIM)
    }
}

impl TextEmbedder for MiniLmEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.run_inference(text)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }
}

/// Attention-masked mean pooling followed by L2 normalization.
///
/// Mirrors the sentence-transformers pooling head: padding tokens (mask 0)
/// are excluded from the mean.
fn mean_pool(
    data: &[f32],
    attention_mask: &[i64],
    tokens: usize,
    dim: usize,
) -> Result<Vec<f32>, EmbeddingError> {
    let hidden = ArrayView2::from_shape((tokens, dim), data)
        .map_err(|e| EmbeddingError::Inference(format!("Bad hidden-state layout: {}", e)))?;

    let mut pooled = vec![0.0f32; dim];
    let mut counted = 0.0f32;
    for (row, &mask) in hidden.rows().into_iter().zip(attention_mask) {
        if mask == 0 {
            continue;
        }
        counted += 1.0;
        for (acc, &value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
    }

    if counted == 0.0 {
        return Err(EmbeddingError::Inference(
            "Attention mask is all zeros".to_string(),
        ));
    }

    for value in pooled.iter_mut() {
        *value /= counted;
    }

    let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in pooled.iter_mut() {
            *value /= norm;
        }
    }

    Ok(pooled)
}
