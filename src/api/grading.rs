use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::{GradingRequest, GradingResponse};
use crate::services::answer_grading;

pub(crate) async fn check_with_ai(
    State(state): State<AppState>,
    payload: Result<Json<GradingRequest>, JsonRejection>,
) -> Result<Json<GradingResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let correct = answer_grading::grade(state.llm(), &payload.question, &payload.answer)
        .await
        .map_err(|err| ApiError::upstream(&err))?;

    Ok(Json(GradingResponse { correct }))
}
