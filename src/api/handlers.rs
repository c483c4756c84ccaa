use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::api::errors::ApiError;
use crate::api::guards::Session;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{AssessmentListResponse, HealthResponse, MessageEnvelope};

/// Identity whose assessments the root endpoint lists, whoever is calling.
pub(crate) const DEMO_USER_ID: &str = "user_2t8a9D9AoXQQmR84PB4yRI2B1Kc";

pub(crate) async fn root(
    State(state): State<AppState>,
    Session(caller): Session,
) -> Result<Json<AssessmentListResponse>, ApiError> {
    tracing::info!(
        signed_in = caller.is_signed_in(),
        caller = caller.subject().unwrap_or("-"),
        "Root listing requested"
    );

    let assessments = state
        .store()
        .list_for_user(DEMO_USER_ID)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assessments"))?;

    Ok(Json(MessageEnvelope { message: assessments }))
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    match state.store().ping().await {
        Ok(()) => {
            components.insert("database".to_string(), "healthy".to_string());
        }
        Err(err) => {
            components.insert("database".to_string(), format!("unhealthy: {err}"));
            status = "unhealthy".to_string();
        }
    }

    Json(HealthResponse { service: "quizgen-api".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
