//! Gemini-API-shaped endpoint so existing `generateContent` clients can point
//! at the wrapper unchanged.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

const ACTION_SUFFIX: &str = ":generateContent";

#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentRequest {
    #[serde(default)]
    pub contents: Vec<Content>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerateContentRequest {
    /// The question is the first part of the first content entry; anything
    /// after it is ignored.
    fn prompt(&self) -> Option<&str> {
        let text = self.contents.first()?.parts.first()?.text.as_deref()?.trim();
        (!text.is_empty()).then_some(text)
    }
}

/// `gemini-2.5-flash:generateContent` → `gemini-2.5-flash`.
fn model_id(raw: &str) -> &str {
    raw.strip_suffix(ACTION_SUFFIX).unwrap_or(raw)
}

/// POST /v1beta/models/{model}
pub async fn generate_content(
    State(app): State<AppState>,
    Path(model): Path<String>,
    payload: Result<Json<GenerateContentRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(req) = payload.map_err(|_| AppError::bad_request("Invalid request format"))?;
    let prompt = req
        .prompt()
        .ok_or_else(|| AppError::bad_request("No text content in request"))?;

    let model = model_id(&model).to_string();
    let answer = app.bridge.ask(prompt, Some(&model)).await?;

    let mut body = serde_json::json!({
        "model": model,
        "candidates": [{
            "content": { "parts": [{ "text": answer.text }] }
        }],
    });
    if let Some(status) = answer.status {
        body["status"] = serde_json::json!(status);
    }
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_generate_content_suffix() {
        assert_eq!(model_id("gemini-2.5-flash:generateContent"), "gemini-2.5-flash");
        assert_eq!(model_id("gemini-2.5-pro"), "gemini-2.5-pro");
    }

    #[test]
    fn prompt_is_first_part_of_first_content() {
        let req: GenerateContentRequest = serde_json::from_value(serde_json::json!({
            "contents": [
                {"parts": [{"text": "  first  "}, {"text": "ignored"}]},
                {"parts": [{"text": "second"}]}
            ]
        }))
        .unwrap();
        assert_eq!(req.prompt(), Some("first"));
    }

    #[test]
    fn later_text_does_not_stand_in_for_missing_first_part() {
        let req: GenerateContentRequest = serde_json::from_value(serde_json::json!({
            "contents": [
                {"parts": [{"inlineData": {}}, {"text": "caption"}]},
                {"parts": [{"text": "second"}]}
            ]
        }))
        .unwrap();
        assert_eq!(req.prompt(), None);

        let blank: GenerateContentRequest = serde_json::from_value(serde_json::json!({
            "contents": [{"parts": [{"text": "   "}]}]
        }))
        .unwrap();
        assert_eq!(blank.prompt(), None);
    }

    #[test]
    fn prompt_absent_without_contents() {
        assert_eq!(GenerateContentRequest::default().prompt(), None);
    }
}
