//! Answer endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use reportqa_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
};

/// Answer request
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

/// Answer response
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

/// Answer a question across all registered collections
pub async fn answer(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/answer");

    let outcome = match payload {
        Ok(Json(request)) => respond(&state, request).await,
        Err(rejection) => Err(AppError::from(rejection)),
    };
    let status = match &outcome {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    request_metrics.finish(status);

    outcome.map(Json)
}

async fn respond(state: &AppState, request: AnswerRequest) -> Result<AnswerResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let answer = state.facade.answer(&request.question).await?;

    tracing::debug!(
        sub_answers = answer.sub_answers.len(),
        used_fallback = answer.used_fallback,
        "Answer ready"
    );

    Ok(AnswerResponse { answer: answer.text })
}
