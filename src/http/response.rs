//! Usage: Response decoding and server error-message extraction.

use crate::shared::error::{AppError, AppResult};
use crate::shared::security::sanitize_body_snippet;
use serde::de::DeserializeOwned;
use serde_json::Value;

const ERROR_SNIPPET_MAX_CHARS: usize = 300;

/// Human-readable message from a backend error body.
///
/// Priority: `detail`, `message`, `errors.*` (recursively), then the first
/// message of the first field error (`{"password": ["..."]}`).
pub fn server_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    message_from_value(&value)
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        Value::Array(items) => items.iter().find_map(message_from_value),
        Value::Object(map) => {
            for key in ["detail", "message"] {
                if let Some(found) = map.get(key).and_then(message_from_value) {
                    return Some(found);
                }
            }
            if let Some(found) = map.get("errors").and_then(message_from_value) {
                return Some(found);
            }
            map.iter()
                .filter(|(key, _)| !matches!(key.as_str(), "code" | "status"))
                .find_map(|(_, nested)| match nested {
                    Value::Array(_) | Value::String(_) => message_from_value(nested),
                    _ => None,
                })
        }
        _ => None,
    }
}

/// First message for one form field, e.g. `new_username` or `password`.
pub fn field_error_message(body: &str, field: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let errors = value.get("errors").unwrap_or(&value);
    errors.get(field).and_then(message_from_value)
}

pub(crate) fn http_error(status: reqwest::StatusCode, body: &str) -> AppError {
    let message = server_error_message(body).unwrap_or_else(|| {
        let snippet = sanitize_body_snippet(body, ERROR_SNIPPET_MAX_CHARS);
        if snippet.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            snippet
        }
    });
    AppError::new(format!("HTTP_{}", status.as_u16()), message)
}

/// Body text of a successful response, or an `HTTP_<status>` error.
pub async fn read_text(response: reqwest::Response) -> AppResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: response read failed: {e}"))?;
    if !status.is_success() {
        return Err(http_error(status, &body));
    }
    Ok(body)
}

/// Decode a successful JSON response. An empty body decodes as `null`, so
/// `()` and `Option<T>` targets work for `204 No Content`.
pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
    let body = read_text(response).await?;
    parse_json_body(&body)
}

pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &str) -> AppResult<T> {
    let source = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(source).map_err(|e| {
        AppError::new(
            "SYSTEM_ERROR",
            format!("response json does not match expected shape: {e}"),
        )
        .with_source(e)
    })
}
