//! Axum routes for the privacy filter service.
//!
//! Every handler delegates to the library core through the async facade.
//! Network callers receive only the opaque mapping handle; the full
//! token map never crosses the HTTP boundary.

use std::sync::Arc;

use aegis_core::{AegisPolicy, AsyncAegis, MappingHandle};
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

/// Maximum request body size in bytes (2 MiB).
///
/// Large enough for realistic prompt payloads while bounding memory per
/// request.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Shared handler state.
pub struct ApiState {
    /// The async engine facade.
    pub aegis: AsyncAegis,
}

/// Builds the service router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/sanitize", post(sanitize_handler))
        .route("/desanitize", post(desanitize_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Request body for `POST /sanitize`.
#[derive(Debug, Deserialize)]
pub struct SanitizeRequest {
    /// Raw text to sanitize.
    pub text: String,

    /// Session scope; generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Redaction policy; engine default when absent.
    #[serde(default)]
    pub policy: Option<AegisPolicy>,
}

/// Response body for `POST /sanitize`.
#[derive(Debug, Serialize)]
pub struct SanitizeResponse {
    /// The sanitized text.
    pub text: String,

    /// Opaque mapping handle. Contains no sensitive values.
    pub map: MappingHandle,
}

/// Request body for `POST /desanitize`.
#[derive(Debug, Deserialize)]
pub struct DesanitizeRequest {
    /// Text containing tokens.
    pub text: String,

    /// Session scope.
    pub session_id: String,

    /// Whether the caller may see original values.
    #[serde(default)]
    pub authorized: bool,
}

/// Response body for `POST /desanitize`.
#[derive(Debug, Serialize)]
pub struct DesanitizeResponse {
    /// The (possibly) re-identified text.
    pub text: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,

    /// Engine identifier.
    pub engine: String,

    /// Loaded model identifier.
    pub model: String,
}

async fn sanitize_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SanitizeRequest>,
) -> Result<Json<SanitizeResponse>, ApiError> {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = state
        .aegis
        .sanitize(request.text, session_id, request.policy)
        .await?;

    Ok(Json(SanitizeResponse {
        text: outcome.text,
        map: outcome.handle,
    }))
}

async fn desanitize_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<DesanitizeRequest>,
) -> Result<Json<DesanitizeResponse>, ApiError> {
    let text = state
        .aegis
        .desanitize(request.text, request.session_id, request.authorized)
        .await?;
    Ok(Json(DesanitizeResponse { text }))
}

async fn health_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let health = state.aegis.health();
    if health.status != "protected" {
        return Err(ApiError::Unavailable);
    }
    info!(model = %health.model, "health check");
    Ok(Json(HealthResponse {
        status: health.status,
        engine: health.engine,
        model: health.model,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::Aegis;

    fn state() -> Arc<ApiState> {
        let engine = Aegis::builder().build().unwrap();
        Arc::new(ApiState {
            aegis: AsyncAegis::new(Arc::new(engine)),
        })
    }

    #[tokio::test]
    async fn test_sanitize_returns_handle_not_mappings() {
        let state = state();
        let Json(response) = sanitize_handler(
            State(Arc::clone(&state)),
            Json(SanitizeRequest {
                text: "Patient John Doe has a rash.".to_string(),
                session_id: Some("s1".to_string()),
                policy: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.text, "Patient [PATIENT_A] has a rash.");
        assert_eq!(response.map.session_id, "s1");

        // The wire shape carries only handle fields.
        let body = serde_json::to_value(&response).unwrap();
        let map = body.get("map").unwrap();
        assert!(map.get("session_id").is_some());
        assert!(map.get("created_at").is_some());
        assert!(map.get("expires_at").is_some());
        assert!(map.get("mappings").is_none());
    }

    #[tokio::test]
    async fn test_sanitize_generates_session_id_when_absent() {
        let state = state();
        let Json(response) = sanitize_handler(
            State(state),
            Json(SanitizeRequest {
                text: "hello".to_string(),
                session_id: None,
                policy: None,
            }),
        )
        .await
        .unwrap();

        assert!(Uuid::parse_str(&response.map.session_id).is_ok());
    }

    #[tokio::test]
    async fn test_desanitize_round_trip() {
        let state = state();
        sanitize_handler(
            State(Arc::clone(&state)),
            Json(SanitizeRequest {
                text: "John Doe called.".to_string(),
                session_id: Some("s1".to_string()),
                policy: None,
            }),
        )
        .await
        .unwrap();

        let Json(revealed) = desanitize_handler(
            State(Arc::clone(&state)),
            Json(DesanitizeRequest {
                text: "[PATIENT_A] called.".to_string(),
                session_id: "s1".to_string(),
                authorized: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(revealed.text, "John Doe called.");

        // Unauthorized requests keep tokens in place.
        let Json(kept) = desanitize_handler(
            State(state),
            Json(DesanitizeRequest {
                text: "[PATIENT_A] called.".to_string(),
                session_id: "s1".to_string(),
                authorized: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(kept.text, "[PATIENT_A] called.");
    }

    #[tokio::test]
    async fn test_invalid_policy_is_bad_request() {
        let state = state();
        let mut policy = AegisPolicy::default();
        policy.confidence_score = 7.0;

        let result = sanitize_handler(
            State(state),
            Json(SanitizeRequest {
                text: "John Doe".to_string(),
                session_id: Some("s1".to_string()),
                policy: Some(policy),
            }),
        )
        .await;

        let err = result.err().expect("policy should be rejected");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let state = state();
        let Json(health) = health_handler(State(state)).await.unwrap();
        assert_eq!(health.status, "protected");
        assert_eq!(health.engine, "aegis-core");
    }
}
