//! API request and response models.

use std::collections::BTreeMap;

use palisade_core::{Confidence, DetectionMethod, LayerBreakdown, RiskLevel};
use serde::{Deserialize, Serialize};

/// Maximum accepted request text length, in characters.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// `status` value when a request is blocked.
pub const STATUS_THREAT: &str = "THREAT DETECTED";

/// `status` value when a request passes.
pub const STATUS_SAFE: &str = "SAFE";

/// Request body for POST /check.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// The text to classify. `user_input` is accepted as a legacy alias.
    #[serde(alias = "user_input")]
    pub text: String,
    /// Caller-supplied tag echoed back unchanged.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "unknown".to_string()
}

/// Response body for POST /check.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    /// Human-readable verdict, consistent with `blocked`.
    pub status: String,
    /// Whether the text should be refused.
    pub blocked: bool,
    /// Matched lexical phrases in corpus order, then the semantic match
    /// preview when that layer blocked.
    pub patterns_found: Vec<String>,
    /// Merged risk level: NONE, LOW, MEDIUM, HIGH, or CRITICAL.
    pub risk_level: RiskLevel,
    /// Confidence in the blocking decision.
    pub confidence: Confidence,
    /// Which layers blocked.
    pub detection_method: DetectionMethod,
    /// Best semantic similarity, rounded to 3 decimals.
    pub similarity_score: f32,
    /// The caller-supplied source tag, echoed back.
    pub source: String,
    /// Per-layer verdicts.
    pub layers: LayerBreakdown,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response body for GET /.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub description: String,
    pub endpoints: BTreeMap<String, String>,
}
