use std::sync::OnceLock;

use regex::Regex;

use crate::types::{ParsedResponse, UpstreamStatus};

pub const RATE_LIMITED_CODE: &str = "rate_limited";
pub const RATE_LIMITED_MESSAGE: &str = "upstream capacity exhausted; retry later";
pub const MODEL_NOT_FOUND_CODE: &str = "model_not_found";

/// Model identifiers the CLI accepts, surfaced in the not-found hint.
pub const KNOWN_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-3-pro-preview",
    "gemini-3-flash-preview",
];

static RATE_LIMIT_RE: OnceLock<Regex> = OnceLock::new();
static MODEL_NOT_FOUND_RE: OnceLock<Regex> = OnceLock::new();

fn rate_limit_re() -> &'static Regex {
    RATE_LIMIT_RE.get_or_init(|| {
        Regex::new(
            r#"(?i)status:?\s*429\b|"code"\s*:\s*"?429\b|\bcode:?\s*429\b|too many requests|ratelimitexceeded|resource_exhausted"#,
        )
        .unwrap()
    })
}

fn model_not_found_re() -> &'static Regex {
    MODEL_NOT_FOUND_RE.get_or_init(|| {
        Regex::new(
            r"(?i)ModelNotFoundError|models/[\w.\-]+ is not found|model .{0,80}not found|Requested entity was not found",
        )
        .unwrap()
    })
}

/// Normalize whatever failure signal the CLI emitted into one shape.
///
/// A structured error code on the parsed payload wins; otherwise the raw
/// output is matched against known rate-limit phrasings, then known
/// unknown-model phrasings. `None` means nothing recognised.
pub fn detect_upstream_status(
    blob: &str,
    parsed: Option<&ParsedResponse>,
) -> Option<UpstreamStatus> {
    if let Some(status) = parsed.and_then(structured_status) {
        return Some(status);
    }
    if rate_limit_re().is_match(blob) {
        return Some(rate_limited());
    }
    if model_not_found_re().is_match(blob) {
        return Some(model_not_found());
    }
    None
}

fn structured_status(parsed: &ParsedResponse) -> Option<UpstreamStatus> {
    let err = parsed.error.as_ref()?;
    let code = u16::try_from(err.code?).ok().filter(|c| (100..=599).contains(c))?;
    Some(UpstreamStatus {
        http_status: code,
        code: err.kind.clone(),
        message: err.message.clone(),
    })
}

pub fn rate_limited() -> UpstreamStatus {
    UpstreamStatus {
        http_status: 429,
        code: RATE_LIMITED_CODE.to_string(),
        message: RATE_LIMITED_MESSAGE.to_string(),
    }
}

pub fn model_not_found() -> UpstreamStatus {
    UpstreamStatus {
        http_status: 404,
        code: MODEL_NOT_FOUND_CODE.to_string(),
        message: format!(
            "requested model is not available; use one of: {}",
            KNOWN_MODELS.join(", ")
        ),
    }
}

/// True when the raw output names an unknown model.
pub fn mentions_model_not_found(blob: &str) -> bool {
    model_not_found_re().is_match(blob)
}
