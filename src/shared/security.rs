//! Usage: Security-sensitive helpers (token masking for logs and error snippets).

use serde_json::Value;

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

pub(crate) fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN || !trimmed.is_ascii() {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc == "access"
        || key_lc == "refresh"
        || key_lc.contains("token")
        || key_lc.contains("secret")
        || key_lc.contains("password")
        || key_lc == "authorization"
}

pub(crate) fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

/// Short, redacted excerpt of a response body suitable for error messages.
pub(crate) fn sanitize_body_snippet(body: &str, max_chars: usize) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(max_chars).collect();
        }
    }
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::{mask_token, sanitize_body_snippet};

    #[test]
    fn mask_token_keeps_prefix_and_suffix() {
        let token = "abcdef1234567890";
        assert_eq!(mask_token(token), "abcdef...7890");
    }

    #[test]
    fn mask_token_short_values_redacts_fully() {
        assert_eq!(mask_token("abcd"), "****");
        assert_eq!(mask_token("  "), "");
    }

    #[test]
    fn sanitize_body_snippet_masks_token_fields() {
        let raw = r#"{
          "detail": "Token is invalid or expired",
          "access": "eyJhbGciOiJIUzI1NiJ9.payload.sig",
          "nested": {"refresh_token": "refreshvalue123456"}
        }"#;
        let snippet = sanitize_body_snippet(raw, 500);
        assert!(snippet.contains("Token is invalid or expired"));
        assert!(snippet.contains(mask_token("refreshvalue123456").as_str()));
        assert!(!snippet.contains("refreshvalue123456"));
        assert!(!snippet.contains("payload.sig"));
    }

    #[test]
    fn sanitize_body_snippet_truncates_plain_text() {
        let raw = "x".repeat(900);
        assert_eq!(sanitize_body_snippet(&raw, 500).len(), 500);
    }
}
