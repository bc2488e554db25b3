use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gemini_bridge::BridgeError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Carries a caller-facing 400 message through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
///
/// Bridge failures are always reported as 500 with the classified upstream
/// status (when there is one) in the body:
///
/// ```json
/// {"error": "upstream rate limited: ...", "status": {"httpStatus": 429, "code": "rate_limited", "message": "..."}}
/// ```
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        if let Some(e) = self.0.downcast_ref::<BridgeError>() {
            let status = match e {
                BridgeError::InvalidInput => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let mut body = serde_json::json!({ "error": e.to_string() });
            if let Some(upstream) = e.status() {
                body["status"] = serde_json::json!(upstream);
            }
            if status.is_server_error() {
                tracing::warn!(error = %e, "gemini request failed");
            }
            return (status, axum::Json(body)).into_response();
        }

        tracing::error!(error = %format!("{:#}", self.0), "unhandled error");
        let body = serde_json::json!({ "error": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_bridge::UpstreamStatus;

    fn status_429() -> UpstreamStatus {
        UpstreamStatus {
            http_status: 429,
            code: "rate_limited".into(),
            message: "upstream capacity exhausted; retry later".into(),
        }
    }

    #[test]
    fn bad_request_maps_to_400() {
        let response = AppError::bad_request("Question is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_input_maps_to_400() {
        let response = AppError(BridgeError::InvalidInput.into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limited_maps_to_500() {
        let err = BridgeError::UpstreamRateLimited {
            status: status_429(),
        };
        let response = AppError(err.into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn auth_required_maps_to_500() {
        let response = AppError(BridgeError::AuthRequired.into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn timeout_maps_to_500() {
        let err = BridgeError::Timeout(std::time::Duration::from_secs(90));
        let response = AppError(err.into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn session_closed_maps_to_500() {
        let response = AppError(BridgeError::SessionClosed.into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn non_bridge_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn from_bridge_error_keeps_downcast() {
        let err: AppError = BridgeError::NoResponse.into();
        assert!(err.0.downcast_ref::<BridgeError>().is_some());
    }
}
