//! Tolerant extraction of structured records from model output.
//!
//! Model text is untrusted. It may arrive wrapped in a markdown fence
//! (```` ```json ... ``` ````). The fence is removed only when both the
//! opening and the closing fence lines are present; whatever remains must
//! parse as a single JSON object.

use serde::de::DeserializeOwned;

use crate::error::StageError;

const FENCE: &str = "```";

/// Remove a conventional fenced-code wrapper, if present.
///
/// The first line must start with a fence (an info string such as `json`
/// is allowed) and the last non-empty line must be a bare fence. Otherwise
/// the trimmed input is returned unchanged.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with(FENCE) {
        return trimmed;
    }

    let Some(first_newline) = trimmed.find('\n') else {
        return trimmed;
    };
    let Some(last_newline) = trimmed.rfind('\n') else {
        return trimmed;
    };
    if last_newline <= first_newline || trimmed[last_newline + 1..].trim() != FENCE {
        return trimmed;
    }

    trimmed[first_newline + 1..last_newline].trim()
}

/// Parse model output into `T`, requiring a single JSON object.
///
/// Errors carry an empty stage name; callers attach theirs with
/// [`StageError::with_stage`].
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, StageError> {
    let body = strip_code_fence(text);

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| StageError::MalformedResponse {
            stage: "",
            reason: format!("invalid JSON: {e}"),
        })?;

    if !value.is_object() {
        return Err(StageError::MalformedResponse {
            stage: "",
            reason: "expected a JSON object".to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| StageError::MalformedResponse {
        stage: "",
        reason: format!("schema mismatch: {e}"),
    })
}
