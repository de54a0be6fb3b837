//! API route handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::models::{
    CheckRequest, CheckResponse, HealthResponse, ServiceInfo, MAX_TEXT_CHARS, STATUS_SAFE,
    STATUS_THREAT,
};
use crate::state::AppState;

/// POST /check - Classify text and return the verdict.
pub async fn check(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>> {
    if req.text.trim().is_empty() {
        return Err(ApiError::EmptyText);
    }
    let text_chars = req.text.chars().count();
    if text_chars > MAX_TEXT_CHARS {
        return Err(ApiError::TextTooLong(MAX_TEXT_CHARS));
    }

    debug!(text_chars, source = %req.source, "Checking text");

    // Inference holds the session for milliseconds; keep it off the
    // async worker threads.
    let pipeline = state.pipeline.clone();
    let text = req.text;
    let result = tokio::task::spawn_blocking(move || pipeline.detect(&text))
        .await
        .map_err(|e| ApiError::Internal(format!("detection task failed: {}", e)))??;

    let status = if result.blocked {
        STATUS_THREAT
    } else {
        STATUS_SAFE
    };

    info!(
        blocked = result.blocked,
        risk = ?result.risk,
        method = ?result.detection_method,
        source = %req.source,
        "Check complete"
    );

    Ok(Json(CheckResponse {
        status: status.to_string(),
        blocked: result.blocked,
        patterns_found: result.patterns_found,
        risk_level: result.risk,
        confidence: result.confidence,
        detection_method: result.detection_method,
        similarity_score: result.similarity_score,
        source: req.source,
        layers: result.layers,
    }))
}

/// GET /health - Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET / - Service descriptor.
pub async fn index() -> Json<ServiceInfo> {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        "POST /check".to_string(),
        "Classify text for prompt injection".to_string(),
    );
    endpoints.insert("GET /health".to_string(), "Liveness check".to_string());
    endpoints.insert("GET /".to_string(), "This descriptor".to_string());

    Json(ServiceInfo {
        service: "Palisade".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Two-layer prompt injection detection service".to_string(),
        endpoints,
    })
}
