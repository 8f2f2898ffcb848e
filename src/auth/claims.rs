//! Usage: Unverified JWT payload decoding for display purposes (user id, username, expiry).
//!
//! Signatures are not checked here; the backend is the only authority on
//! whether a token is valid.

use crate::shared::error::AppResult;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct AccessClaims {
    payload: Map<String, Value>,
}

pub fn decode_claims(token: &str) -> AppResult<AccessClaims> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err("SEC_INVALID_INPUT: token is not a three-part JWT".to_string().into());
    };

    // JWT segments are unpadded base64url; tolerate issuers that pad anyway.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| format!("SEC_INVALID_INPUT: token payload is not base64url: {e}"))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| format!("SEC_INVALID_INPUT: token payload is not json: {e}"))?;
    match value {
        Value::Object(payload) => Ok(AccessClaims { payload }),
        _ => Err("SEC_INVALID_INPUT: token payload is not a json object"
            .to_string()
            .into()),
    }
}

/// First non-empty string (or number rendered as string) along `paths`.
///
/// Each path is a list of object keys walked from the root.
pub fn first_present(root: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let mut cursor = root;
        for key in path.iter() {
            cursor = cursor.get(*key)?;
        }
        scalar_to_string(cursor)
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

const USER_ID_PATHS: &[&[&str]] = &[&["user_id"], &["id"], &["pk"]];

const USERNAME_PATHS: &[&[&str]] = &[
    &["username"],
    &["user", "username"],
    &["name"],
    &["preferred_username"],
    &["nickname"],
    &["handle"],
    &["sub"],
];

impl AccessClaims {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }

    /// `user_id`, then `id`, then `pk`.
    pub fn user_id(&self) -> Option<String> {
        first_present(&self.as_value(), USER_ID_PATHS)
    }

    /// `username`, `user.username`, `name`, `preferred_username`, `nickname`,
    /// `handle`, and finally `sub`.
    pub fn username(&self) -> Option<String> {
        first_present(&self.as_value(), USERNAME_PATHS)
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.payload.get("exp").and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now_unix)
    }
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_claims_reads_simplejwt_payload() {
        let token = encode_test_jwt(&json!({
            "token_type": "access",
            "exp": 1_900_000_000,
            "user_id": 42,
            "username": "kim"
        }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.user_id().as_deref(), Some("42"));
        assert_eq!(claims.username().as_deref(), Some("kim"));
        assert_eq!(claims.expires_at(), Some(1_900_000_000));
        assert!(!claims.is_expired_at(1_800_000_000));
        assert!(claims.is_expired_at(1_900_000_000));
    }

    #[test]
    fn username_falls_back_through_priority_list() {
        let claims = decode_claims(&encode_test_jwt(&json!({
            "user": {"username": "nested"},
            "nickname": "nick",
            "sub": "subject"
        })))
        .unwrap();
        assert_eq!(claims.username().as_deref(), Some("nested"));

        let claims = decode_claims(&encode_test_jwt(&json!({
            "username": "  ",
            "sub": "subject"
        })))
        .unwrap();
        assert_eq!(claims.username().as_deref(), Some("subject"));
    }

    #[test]
    fn decode_claims_rejects_malformed_tokens() {
        for token in ["", "abc", "a.b", "a.!!!.c", "a.b.c.d"] {
            let err = decode_claims(token).unwrap_err();
            assert_eq!(err.code(), "SEC_INVALID_INPUT", "token={token:?}");
        }
        let not_object = format!("h.{}.s", URL_SAFE_NO_PAD.encode(b"[1,2,3]"));
        assert!(decode_claims(&not_object).is_err());
    }
}
