use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<gemini_bridge::UpstreamStatus>,
}

/// POST /api/ask
///
/// Body: `{ "question": "...", "model": "gemini-2.5-flash" }`.
pub async fn ask(
    State(app): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(req) = payload.map_err(|_| AppError::bad_request("Invalid request format"))?;
    if req.question.trim().is_empty() {
        return Err(AppError::bad_request("Question is required"));
    }

    let answer = app.bridge.ask(&req.question, req.model.as_deref()).await?;
    if let Some(status) = &answer.status {
        tracing::warn!(
            http_status = status.http_status,
            code = %status.code,
            "answer returned with upstream status"
        );
    }

    Ok(Json(AskResponse {
        answer: answer.text,
        status: answer.status,
    }))
}
