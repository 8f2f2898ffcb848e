//! Usage: Author name / id resolution over the loosely-shaped post and comment payloads.
//!
//! Different backend serializers expose the author under different fields, so
//! every lookup goes through one ordered candidate list instead of ad hoc
//! fallbacks at each call site.

use crate::auth::claims::AccessClaims;
use serde_json::Value;

pub const ANONYMOUS_DISPLAY_NAME: &str = "anonymous";

/// Display-name candidates, highest priority first.
const DISPLAY_NAME_PATHS: &[&[&str]] = &[
    &["author_display"],
    &["author", "nickname"],
    &["author", "username"],
    &["author_username"],
    &["author"],
    &["username"],
    &["user", "username"],
    &["user"],
    &["writer"],
];

/// Username candidates used for ownership checks.
const OWNER_USERNAME_PATHS: &[&[&str]] = &[
    &["author_username"],
    &["author", "username"],
    &["author"],
    &["user", "username"],
];

/// Numeric author id candidates.
const OWNER_ID_PATHS: &[&[&str]] = &[
    &["author"],
    &["author", "id"],
    &["author", "pk"],
    &["user"],
    &["user", "id"],
    &["user_id"],
    &["author_id"],
];

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |cursor, key| cursor.get(*key))
}

fn is_numeric_str(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|ch| ch.is_ascii_digit())
}

/// First non-empty, non-numeric string along `paths`. Numeric strings are
/// skipped because several serializers put the author's primary key in
/// `author`.
fn first_name(root: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let s = lookup(root, path)?.as_str()?.trim();
        if s.is_empty() || is_numeric_str(s) {
            return None;
        }
        Some(s.to_string())
    })
}

pub fn author_name(value: &Value) -> Option<String> {
    first_name(value, DISPLAY_NAME_PATHS)
}

pub fn author_display_name(value: &Value) -> String {
    author_name(value).unwrap_or_else(|| ANONYMOUS_DISPLAY_NAME.to_string())
}

pub fn author_username(value: &Value) -> Option<String> {
    first_name(value, OWNER_USERNAME_PATHS)
}

pub fn author_id(value: &Value) -> Option<i64> {
    OWNER_ID_PATHS
        .iter()
        .find_map(|path| match lookup(value, path)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) if is_numeric_str(s.trim()) => s.trim().parse().ok(),
            _ => None,
        })
}

/// Whether the signed-in user (from token claims) wrote this post or comment.
/// Matches by numeric id first, then by username.
pub fn is_owned_by(value: &Value, claims: &AccessClaims) -> bool {
    let by_id = match (
        author_id(value),
        claims.user_id().and_then(|id| id.trim().parse::<i64>().ok()),
    ) {
        (Some(author), Some(user)) => author == user,
        _ => false,
    };
    if by_id {
        return true;
    }

    match (author_username(value), claims.username()) {
        (Some(author), Some(user)) => author == user,
        _ => false,
    }
}
