use axum::Json;

/// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Gemini Wrapper API",
        "status": "running",
    }))
}
