use serde::{Deserialize, Deserializer, Serialize};

// ─── ParsedResponse ───────────────────────────────────────────────────────

/// The single JSON object `gemini --output-format json` prints on exit.
///
/// ```json
/// {"response": "...", "stats": {"models": {...}}, "error": {"type": "...", "message": "...", "code": 429}}
/// ```
///
/// Every field is optional on the wire; an object that carries none of them
/// still deserializes (callers decide whether it is useful).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ParsedResponse {
    #[serde(default)]
    pub response: String,
    /// Token/latency statistics. Opaque to the bridge; passed through.
    #[serde(default)]
    pub stats: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ErrorInfo {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    /// Accepts `429` or `"429"`; anything else becomes `None`.
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<i64>,
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// ─── UpstreamStatus ───────────────────────────────────────────────────────

/// Normalized classification of an upstream failure signal, independent of
/// how the CLI phrased it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStatus {
    pub http_status: u16,
    pub code: String,
    pub message: String,
}

// ─── Answer ───────────────────────────────────────────────────────────────

/// A successful (possibly degraded) bridge result.
///
/// `status` is `Some` when the answer was salvaged alongside a classified
/// upstream failure such as a rate limit; callers decide how to react.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub status: Option<UpstreamStatus>,
    pub stats: serde_json::Value,
}

impl Answer {
    pub fn text(text: impl Into<String>) -> Self {
        Answer {
            text: text.into(),
            status: None,
            stats: serde_json::Value::Null,
        }
    }
}
