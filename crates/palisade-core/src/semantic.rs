//! Semantic similarity matching: the second detection layer.
//!
//! Embeds the raw input once, compares it against precomputed embeddings
//! of the semantic corpus via cosine similarity, and maps the best score
//! to a risk tier.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::corpus::ThreatCorpus;
use crate::embedding::{cosine_similarity, EmbeddingError, TextEmbedder};
use crate::risk::RiskLevel;

/// Similarity at or above this tier is CRITICAL. Fixed.
pub const CRITICAL_BREAKPOINT: f32 = 0.75;
/// Similarity at or above this tier (below CRITICAL) is HIGH. Fixed.
pub const HIGH_BREAKPOINT: f32 = 0.60;
/// Floor of the LOW tier; anything below scores NONE.
pub const LOW_FLOOR: f32 = 0.40;
/// Default MEDIUM/LOW boundary: the lowest similarity that blocks.
pub const DEFAULT_BLOCK_THRESHOLD: f32 = 0.50;

/// Configuration for the semantic layer.
#[derive(Debug, Clone)]
pub struct SemanticConfig {
    /// Lowest similarity that still blocks (the MEDIUM tier floor).
    /// Clamped to [`LOW_FLOOR`, `HIGH_BREAKPOINT`]; the upper breakpoints
    /// are not configurable.
    pub block_threshold: f32,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
        }
    }
}

impl SemanticConfig {
    /// Creates a config with a custom blocking threshold.
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            block_threshold: threshold.clamp(LOW_FLOOR, HIGH_BREAKPOINT),
        }
    }
}

/// Verdict from the semantic layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticVerdict {
    /// True when the best score reached the blocking threshold.
    pub blocked: bool,
    /// Tier for the best score.
    pub risk: RiskLevel,
    /// Highest cosine similarity against the corpus, unrounded.
    pub best_score: f32,
    /// The closest corpus phrase. Present only when blocked, so corpus
    /// content does not leak for non-actionable near-misses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_pattern: Option<String>,
}

/// Error embedding the corpus at construction time.
#[derive(Debug, Error)]
#[error("Failed to embed corpus pattern {index}: {source}")]
pub struct SemanticInitError {
    /// Index of the corpus entry that failed.
    pub index: usize,
    #[source]
    pub source: EmbeddingError,
}

/// Compares input against precomputed corpus embeddings.
///
/// Construction embeds the whole semantic corpus through the provider;
/// that is the one expensive step, performed exactly once. After that the
/// matcher is immutable and safe to share.
pub struct SemanticMatcher {
    embedder: Arc<dyn TextEmbedder>,
    patterns: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    block_threshold: f32,
}

impl SemanticMatcher {
    /// Embeds the semantic corpus and holds the vectors read-only.
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        corpus: &ThreatCorpus,
        config: SemanticConfig,
    ) -> Result<Self, SemanticInitError> {
        let patterns: Vec<String> = corpus.semantic().to_vec();
        let mut embeddings = Vec::with_capacity(patterns.len());
        for (index, pattern) in patterns.iter().enumerate() {
            let vector = embedder
                .embed(pattern)
                .map_err(|source| SemanticInitError { index, source })?;
            embeddings.push(vector);
        }

        let block_threshold = config.block_threshold.clamp(LOW_FLOOR, HIGH_BREAKPOINT);
        info!(
            patterns = patterns.len(),
            provider = embedder.name(),
            threshold = block_threshold,
            "Semantic corpus embedded"
        );

        Ok(Self {
            embedder,
            patterns,
            embeddings,
            block_threshold,
        })
    }

    /// Scores `text` against the corpus and maps the best score to a tier.
    ///
    /// The raw text is embedded as-is; lexical canonicalization is
    /// deliberately not applied. A provider failure aborts the call and is
    /// never reported as a low score.
    pub fn detect(&self, text: &str) -> Result<SemanticVerdict, EmbeddingError> {
        let vector = self.embedder.embed(text)?;

        let mut best_index = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for (index, corpus_vector) in self.embeddings.iter().enumerate() {
            let score = cosine_similarity(&vector, corpus_vector);
            // Strict comparison keeps the first corpus entry on ties
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }

        let (risk, blocked) = tier_for(best_score, self.block_threshold);
        let best_pattern = if blocked {
            Some(self.patterns[best_index].clone())
        } else {
            None
        };

        debug!(score = best_score, risk = ?risk, blocked, "Semantic scan complete");

        Ok(SemanticVerdict {
            blocked,
            risk,
            best_score,
            best_pattern,
        })
    }

    /// Number of corpus patterns held.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// The effective (clamped) blocking threshold.
    pub fn block_threshold(&self) -> f32 {
        self.block_threshold
    }
}

/// Maps a similarity score to (risk, blocked).
///
/// Every tier boundary is an inclusive lower bound; a score exactly at
/// `block_threshold` is MEDIUM and blocks.
fn tier_for(score: f32, block_threshold: f32) -> (RiskLevel, bool) {
    if score >= CRITICAL_BREAKPOINT {
        (RiskLevel::Critical, true)
    } else if score >= HIGH_BREAKPOINT {
        (RiskLevel::High, true)
    } else if score >= block_threshold {
        (RiskLevel::Medium, true)
    } else if score >= LOW_FLOOR {
        (RiskLevel::Low, false)
    } else {
        (RiskLevel::None, false)
    }
}
