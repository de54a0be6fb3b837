//! Risk model shared by both detection layers and the aggregator.

use serde::{Deserialize, Serialize};

/// Severity of a detected threat, ordered from benign to critical.
///
/// Verdict merging always compares these ordinally; the wire form
/// (`NONE`..`CRITICAL`) is presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// No threat signal.
    None,
    /// Weak semantic similarity, below the blocking threshold.
    Low,
    /// Semantic similarity at or above the blocking threshold.
    Medium,
    /// A lexical corpus hit, or strong semantic similarity.
    High,
    /// Near-certain semantic match against the threat corpus.
    Critical,
}

impl RiskLevel {
    /// Returns the wire form of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "NONE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Which layers produced a blocking verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Neither layer blocked.
    None,
    /// Only the lexical layer blocked.
    LexicalOnly,
    /// Only the semantic layer blocked.
    SemanticOnly,
    /// Both layers blocked independently.
    LexicalAndSemantic,
}

impl DetectionMethod {
    /// Derives the method tag from the two layers' blocking flags.
    pub fn from_layers(lexical_blocked: bool, semantic_blocked: bool) -> Self {
        match (lexical_blocked, semantic_blocked) {
            (true, true) => DetectionMethod::LexicalAndSemantic,
            (true, false) => DetectionMethod::LexicalOnly,
            (false, true) => DetectionMethod::SemanticOnly,
            (false, false) => DetectionMethod::None,
        }
    }

    /// Fixed mapping from agreement to confidence.
    ///
    /// This is a function of which layers agreed, never of the numeric
    /// similarity score.
    pub fn confidence(self) -> Confidence {
        match self {
            DetectionMethod::LexicalAndSemantic => Confidence::VeryHigh,
            DetectionMethod::LexicalOnly => Confidence::High,
            DetectionMethod::SemanticOnly => Confidence::Medium,
            DetectionMethod::None => Confidence::Safe,
        }
    }
}

/// Qualitative confidence in the blocking decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// No layer blocked.
    Safe,
    /// One layer blocked on a statistical signal.
    Medium,
    /// One layer blocked on an exact phrase.
    High,
    /// Two independent layers agreed.
    VeryHigh,
}
