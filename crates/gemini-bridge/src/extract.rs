//! Recover the headless CLI's JSON payload from mixed output.
//!
//! `gemini --output-format json` prints exactly one JSON object, but retry
//! diagnostics and warnings land on the same streams first, and those may
//! contain brace-like text of their own. The payload is always the last
//! structured thing emitted, so the scan runs backwards from the end.

use crate::types::ParsedResponse;

/// Return the last balanced `{...}` object in `blob`.
///
/// Braces inside string literals are ignored; a quote is a delimiter unless
/// it is preceded by an odd run of backslashes. Text after the final `}` is
/// treated as trailing noise and is not string-tracked.
pub fn extract_last_json_object(blob: &str) -> Option<&str> {
    let bytes = blob.as_bytes();
    let mut end: Option<usize> = None;
    let mut depth = 0usize;
    let mut in_string = false;

    for i in (0..bytes.len()).rev() {
        let b = bytes[i];
        let Some(end_idx) = end else {
            if b == b'}' {
                end = Some(i);
                depth = 1;
            }
            continue;
        };

        if b == b'"' && !is_escaped(bytes, i) {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match b {
            b'}' => depth += 1,
            b'{' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&blob[i..=end_idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_escaped(bytes: &[u8], quote_idx: usize) -> bool {
    let backslashes = bytes[..quote_idx]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    backslashes % 2 == 1
}

/// Extract and deserialize the headless payload.
///
/// Returns `None` when there is no balanced object or when the object is not
/// shaped like a CLI response.
pub fn parse_response(blob: &str) -> Option<ParsedResponse> {
    let json = extract_last_json_object(blob)?;
    match serde_json::from_str::<ParsedResponse>(json) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!(error = %e, "trailing JSON object is not a CLI response");
            None
        }
    }
}
