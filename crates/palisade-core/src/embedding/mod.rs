//! Text embedding provider abstraction.
//!
//! The semantic layer only ever talks to [`TextEmbedder`]: a provider turns
//! text into a fixed-dimension vector, and vectors are compared via
//! [`cosine_similarity`]. The production provider is
//! [`minilm::MiniLmEmbedder`].

pub mod minilm;

use thiserror::Error;

/// Errors from an embedding provider.
///
/// Every variant is fatal for the request that triggered it: a failed
/// embedding must never read as "no threat found".
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model file not found.
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Tokenizer file not found.
    #[error("Tokenizer file not found: {0}")]
    TokenizerNotFound(String),

    /// ONNX runtime error.
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),

    /// Tokenizer error.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Inference produced unusable output.
    #[error("Inference error: {0}")]
    Inference(String),
}

impl From<tokenizers::Error> for EmbeddingError {
    fn from(e: tokenizers::Error) -> Self {
        EmbeddingError::Tokenizer(e.to_string())
    }
}

/// A text-to-vector model.
///
/// One instance is shared across concurrent detection calls, so
/// implementations are `Send + Sync`; any exclusive access an
/// implementation needs (such as an inference session) stays internal.
pub trait TextEmbedder: Send + Sync {
    /// Embeds `text` into a fixed-dimension vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimension of the vectors produced by [`embed`](Self::embed).
    fn dimension(&self) -> usize;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for zero-magnitude or length-mismatched inputs instead of
/// NaN, so degenerate vectors read as "not similar".
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
