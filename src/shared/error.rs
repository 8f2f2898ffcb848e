//! Usage: Unified client error model (maps internal failures to `CODE: message` strings).

use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: String,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for failures after which the stored session is gone and the
    /// caller has to send the user through a login flow again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self.code.as_str(),
            "AUTH_LOGIN_REQUIRED"
                | "AUTH_REFRESH_FAILED"
                | "AUTH_REFRESH_TIMEOUT"
                | "AUTH_REFRESH_ABORTED"
        )
    }

    /// HTTP status carried by `HTTP_<status>` codes.
    pub fn http_status(&self) -> Option<u16> {
        self.code.strip_prefix("HTTP_")?.parse().ok()
    }
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            let message = if rest.is_empty() { value.trim() } else { rest };
            return AppError::new(code.to_string(), message.to_string());
        }
        AppError::new("INTERNAL_ERROR", value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_string_splits_code_prefix() {
        let err = AppError::from(
            "AUTH_REFRESH_FAILED: refresh endpoint returned status=401".to_string(),
        );
        assert_eq!(err.code(), "AUTH_REFRESH_FAILED");
        assert_eq!(err.message(), "refresh endpoint returned status=401");
        assert_eq!(
            err.to_string(),
            "AUTH_REFRESH_FAILED: refresh endpoint returned status=401"
        );
    }

    #[test]
    fn from_string_without_code_is_internal() {
        let err = AppError::from("something broke: badly".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.message(), "something broke: badly");
    }

    #[test]
    fn http_status_parses_numeric_suffix() {
        assert_eq!(AppError::new("HTTP_404", "missing").http_status(), Some(404));
        assert_eq!(AppError::new("SYSTEM_ERROR", "x").http_status(), None);
    }

    #[test]
    fn refresh_failures_require_login() {
        assert!(AppError::new("AUTH_REFRESH_FAILED", "x").requires_login());
        assert!(AppError::new("AUTH_REFRESH_TIMEOUT", "x").requires_login());
        assert!(!AppError::new("HTTP_500", "x").requires_login());
    }
}
