//! Palisade Core - Prompt injection detection logic.
//!
//! This crate provides the detection pipeline for the Palisade prompt
//! firewall: text normalization, the threat corpus, the lexical and
//! semantic matchers, and verdict aggregation. The HTTP surface lives in
//! `palisade-server`.

pub mod corpus;
pub mod embedding;
pub mod lexical;
pub mod model_fetch;
pub mod normalize;
pub mod pipeline;
pub mod risk;
pub mod semantic;

pub use corpus::{CorpusError, ThreatCorpus};
pub use embedding::minilm::{MiniLmConfig, MiniLmEmbedder, EMBEDDING_DIM};
pub use embedding::{cosine_similarity, EmbeddingError, TextEmbedder};
pub use lexical::{LexicalMatcher, LexicalVerdict};
pub use model_fetch::{FetchError, ModelFetcher};
pub use normalize::{normalize, NormalizedText};
pub use pipeline::{DetectionPipeline, DetectionResult, LayerBreakdown, PipelineError};
pub use risk::{Confidence, DetectionMethod, RiskLevel};
pub use semantic::{SemanticConfig, SemanticInitError, SemanticMatcher, SemanticVerdict};
