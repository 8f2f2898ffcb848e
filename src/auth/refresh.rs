//! Usage: Refresh-token exchange (`POST /auth/refresh/`) and its response parsing.

use crate::shared::error::AppResult;
use crate::shared::security::{mask_token, sanitize_body_snippet};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

const ERROR_SNIPPET_MAX_CHARS: usize = 500;
const ERROR_MESSAGE_MAX_CHARS: usize = 240;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access: String,
    // Present only when the server rotates refresh tokens.
    pub refresh: Option<String>,
}

pub(crate) async fn exchange_refresh_token(
    client: &reqwest::Client,
    endpoint: Url,
    refresh_token: &str,
) -> AppResult<RefreshedTokens> {
    tracing::debug!(
        endpoint = %endpoint,
        refresh_token = %mask_token(refresh_token),
        "exchanging refresh token"
    );

    let response = client
        .post(endpoint)
        .json(&serde_json::json!({ "refresh": refresh_token.trim() }))
        .send()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: token refresh request failed: {e}"))?;

    parse_refresh_response(response).await
}

/// Same as [`exchange_refresh_token`], bounded by `timeout` when non-zero.
pub(crate) async fn exchange_refresh_token_with_timeout(
    client: &reqwest::Client,
    endpoint: Url,
    refresh_token: &str,
    timeout: Duration,
) -> AppResult<RefreshedTokens> {
    if timeout.is_zero() {
        return exchange_refresh_token(client, endpoint, refresh_token).await;
    }
    match tokio::time::timeout(timeout, exchange_refresh_token(client, endpoint, refresh_token))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(format!(
            "AUTH_REFRESH_TIMEOUT: token refresh did not complete within {}s",
            timeout.as_secs_f32()
        )
        .into()),
    }
}

async fn parse_refresh_response(response: reqwest::Response) -> AppResult<RefreshedTokens> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: token refresh response read failed: {e}"))?;

    if !status.is_success() {
        return Err(refresh_error_message(status.as_u16(), &body).into());
    }

    parse_refresh_body(&body)
}

pub(crate) fn parse_refresh_body(body: &str) -> AppResult<RefreshedTokens> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| format!("AUTH_REFRESH_FAILED: token refresh response json invalid: {e}"))?;

    let access = non_empty_str(&value, "access")
        .ok_or_else(|| "AUTH_REFRESH_FAILED: token refresh response missing access".to_string())?;

    Ok(RefreshedTokens {
        access,
        refresh: non_empty_str(&value, "refresh"),
    })
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn refresh_error_message(status: u16, body: &str) -> String {
    let (code, detail) = parse_error_details(body);
    let mut msg = format!("AUTH_REFRESH_FAILED: refresh endpoint returned status={status}");
    if let Some(code) = code {
        msg.push_str(" code=");
        msg.push_str(code.as_str());
    }
    if let Some(detail) = detail {
        msg.push_str(" message=");
        msg.push_str(
            detail
                .chars()
                .take(ERROR_MESSAGE_MAX_CHARS)
                .collect::<String>()
                .as_str(),
        );
    }
    msg.push_str(" body=");
    msg.push_str(sanitize_body_snippet(body, ERROR_SNIPPET_MAX_CHARS).as_str());
    msg
}

/// `code` / `detail` as returned by the backend's auth views, falling back to
/// OAuth-style `error` / `error_description` fields.
pub(crate) fn parse_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let code = non_empty_str(&value, "code").or_else(|| non_empty_str(&value, "error"));
    let detail = non_empty_str(&value, "detail")
        .or_else(|| non_empty_str(&value, "message"))
        .or_else(|| non_empty_str(&value, "error_description"));

    (code, detail)
}
