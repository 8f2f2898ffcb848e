//! Usage: Account endpoints (login, social login, logout, deletion, username and password flows).

use crate::auth::claims::first_present;
use crate::auth::token_store::SessionTokens;
use crate::auth::AuthEvent;
use crate::http::client::ApiClient;
use crate::http::request::ApiRequest;
use crate::http::response::{field_error_message, read_json, read_text, server_error_message};
use crate::shared::error::{AppError, AppResult};
use regex::Regex;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;

const LOGIN_PATH: &str = "/auth/login/";
const LOGOUT_PATH: &str = "/auth/logout/";
const DELETE_ACCOUNT_PATH: &str = "/auth/delete-account/";
const PROFILE_PATH: &str = "/auth/profile/";
const USERNAME_LOOKUP_PATH: &str = "/auth/username-lookup/";
const CHANGE_USERNAME_PATH: &str = "/auth/change-username/";
const PASSWORD_RESET_ISSUE_PATH: &str = "/auth/password-reset/issue/";
const PASSWORD_RESET_CONFIRM_PATH: &str = "/auth/password-reset-confirm/";
const REGISTER_PATH: &str = "/auth/register/";

const PROFILE_USERNAME_PATHS: &[&[&str]] = &[
    &["username"],
    &["user", "username"],
    &["data", "username"],
    &["profile", "username"],
    &["nickname"],
    &["profile", "nickname"],
    &["handle"],
];

#[derive(Debug, Deserialize)]
struct TokenPair {
    access: String,
    refresh: String,
}

fn require_non_empty<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("SEC_INVALID_INPUT: {field} is required").into());
    }
    Ok(trimmed)
}

fn store_session(client: &ApiClient, pair: TokenPair) -> AppResult<SessionTokens> {
    let access = require_non_empty(&pair.access, "access token")
        .map_err(|_| AppError::new("SYSTEM_ERROR", "login response missing access token"))?;
    let refresh = require_non_empty(&pair.refresh, "refresh token")
        .map_err(|_| AppError::new("SYSTEM_ERROR", "login response missing refresh token"))?;
    let tokens = SessionTokens::new(access, refresh);
    client.tokens().save(&tokens)?;
    client.emit(AuthEvent::SignedIn);
    Ok(tokens)
}

fn purge_session(client: &ApiClient) -> AppResult<()> {
    client.tokens().clear()?;
    client.emit(AuthEvent::SignedOut);
    Ok(())
}

/// `AUTH_LOGIN_REQUIRED` unless an access token is stored.
pub fn require_login(client: &ApiClient) -> AppResult<()> {
    if client.is_authenticated()? {
        return Ok(());
    }
    Err("AUTH_LOGIN_REQUIRED: sign in to continue".to_string().into())
}

/// Local login with username or email. Stores the returned token pair.
pub async fn login(
    client: &ApiClient,
    username_or_email: &str,
    password: &str,
) -> AppResult<SessionTokens> {
    let username = require_non_empty(username_or_email, "username")?;
    if password.is_empty() {
        return Err("SEC_INVALID_INPUT: password is required".to_string().into());
    }

    let request = ApiRequest::post(LOGIN_PATH)
        .json(&json!({ "username": username, "password": password }))?;
    let response = client.send_unauthenticated(request).await?;
    if response.status() == StatusCode::UNAUTHORIZED {
        return Err("AUTH_INVALID_CREDENTIALS: username/email or password is incorrect"
            .to_string()
            .into());
    }
    let pair: TokenPair = read_json(response).await?;
    let tokens = store_session(client, pair)?;
    tracing::info!(username, "signed in");
    Ok(tokens)
}

fn validate_provider(provider: &str) -> AppResult<&str> {
    let provider = require_non_empty(provider, "provider")?;
    if !provider
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(format!("SEC_INVALID_INPUT: invalid social provider {provider:?}").into());
    }
    Ok(provider)
}

/// Browser entry point for social login on the backend origin
/// (`/accounts/<provider>/login/?process=login`).
pub fn social_login_url(backend_origin: &Url, provider: &str) -> AppResult<Url> {
    let provider = validate_provider(provider)?;
    let mut url = backend_origin
        .join(&format!("accounts/{provider}/login/"))
        .map_err(|e| format!("CONFIG_ERROR: invalid backend origin: {e}"))?;
    url.query_pairs_mut().append_pair("process", "login");
    Ok(url)
}

/// Exchange an OAuth authorization code for a session (`/auth/social/<provider>/`).
pub async fn complete_social_login(
    client: &ApiClient,
    provider: &str,
    code: &str,
    redirect_uri: &str,
) -> AppResult<SessionTokens> {
    let provider = validate_provider(provider)?;
    let code = require_non_empty(code, "authorization code")?;

    let request = ApiRequest::post(format!("/auth/social/{provider}/"))
        .json(&json!({ "code": code, "redirect_uri": redirect_uri.trim() }))?;
    let response = client.send_unauthenticated(request).await?;
    let status = response.status();
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        return Err(format!(
            "AUTH_SOCIAL_LOGIN_FAILED: authorization code is invalid or expired (status={})",
            status.as_u16()
        )
        .into());
    }
    let pair: TokenPair = read_json(response).await?;
    let tokens = store_session(client, pair)?;
    tracing::info!(provider, "signed in with social provider");
    Ok(tokens)
}

fn params_lookup(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Store the token pair the backend appends to the social-login completion
/// redirect. The fragment is checked before the query string.
pub fn complete_social_redirect(client: &ApiClient, redirect_url: &str) -> AppResult<SessionTokens> {
    let url = Url::parse(redirect_url.trim())
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid redirect url: {e}"))?;

    let fragment_pairs: Vec<(String, String)> = match url.fragment() {
        Some(fragment) if !fragment.is_empty() => {
            // Fragments use query syntax here; parse them through a throwaway URL.
            let carrier = Url::parse(&format!("http://fragment.invalid/?{fragment}"))
                .map_err(|e| format!("SEC_INVALID_INPUT: invalid redirect fragment: {e}"))?;
            carrier.query_pairs().into_owned().collect()
        }
        _ => Vec::new(),
    };
    let query_pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    let pick = |key: &str| {
        params_lookup(&fragment_pairs, key).or_else(|| params_lookup(&query_pairs, key))
    };
    let (Some(access), Some(refresh)) = (pick("access"), pick("refresh")) else {
        return Err("AUTH_SOCIAL_LOGIN_FAILED: redirect did not carry both tokens"
            .to_string()
            .into());
    };

    store_session(client, TokenPair { access, refresh })
}

/// Best-effort server-side logout, then local purge. Server errors are logged
/// and do not prevent the purge.
pub async fn logout(client: &ApiClient) -> AppResult<()> {
    if let Some(refresh) = client.tokens().refresh_token()? {
        let request = ApiRequest::post(LOGOUT_PATH).json(&json!({ "refresh": refresh }))?;
        match client.send(request).await {
            Ok(response) if !response.status().is_success() => {
                tracing::debug!(status = response.status().as_u16(), "logout endpoint rejected request");
            }
            Ok(_) => {}
            Err(err) => tracing::debug!("logout request failed: {}", err),
        }
    }
    purge_session(client)?;
    tracing::info!("signed out");
    Ok(())
}

pub async fn delete_account(client: &ApiClient, password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err("SEC_INVALID_INPUT: password is required".to_string().into());
    }
    require_login(client)?;

    let request = ApiRequest::post(DELETE_ACCOUNT_PATH).json(&json!({ "password": password }))?;
    let response = client.send(request).await?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: response read failed: {e}"))?;
    if !status.is_success() {
        let message = field_error_message(&body, "password")
            .or_else(|| server_error_message(&body))
            .unwrap_or_else(|| "account deletion failed".to_string());
        return Err(AppError::new(format!("HTTP_{}", status.as_u16()), message));
    }

    purge_session(client)?;
    tracing::info!("account deleted");
    Ok(())
}

/// Current username from the profile endpoint, falling back to the access
/// token claims when the profile is unavailable.
pub async fn current_username(client: &ApiClient) -> AppResult<Option<String>> {
    if !client.is_authenticated()? {
        return Ok(None);
    }
    match client.send_json::<Value>(ApiRequest::get(PROFILE_PATH)).await {
        Ok(profile) => {
            if let Some(name) = first_present(&profile, PROFILE_USERNAME_PATHS) {
                return Ok(Some(name));
            }
        }
        Err(err) if err.requires_login() => return Err(err),
        Err(err) => tracing::debug!("profile lookup failed, using token claims: {}", err),
    }
    Ok(client.access_claims()?.and_then(|claims| claims.username()))
}

fn username_regex() -> &'static Regex {
    static USERNAME_RE: OnceLock<Regex> = OnceLock::new();
    USERNAME_RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9가-힣._-]{3,20}$").expect("username regex is valid")
    })
}

/// Trimmed username if it is 3–20 characters of ASCII letters, digits,
/// Hangul syllables, `.`, `_` or `-`.
pub fn validate_username(raw: &str) -> AppResult<String> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return Err("SEC_INVALID_INPUT: username is required".to_string().into());
    }
    if !username_regex().is_match(candidate) {
        return Err(
            "SEC_INVALID_INPUT: username must be 3-20 characters of letters, digits, Hangul, '.', '_' or '-'"
                .to_string()
                .into(),
        );
    }
    Ok(candidate.to_string())
}

#[derive(Debug, Deserialize)]
struct UsernameLookup {
    exists: Option<bool>,
    available: Option<bool>,
}

pub async fn username_exists(client: &ApiClient, username: &str) -> AppResult<bool> {
    let username = validate_username(username)?;
    let lookup: UsernameLookup = client
        .send_json(ApiRequest::get(USERNAME_LOOKUP_PATH).query("username", &username))
        .await?;
    Ok(lookup
        .exists
        .unwrap_or_else(|| lookup.available == Some(false)))
}

/// Change the username; `password` is only required for local accounts.
/// Returns the username the server reports (or the requested one).
pub async fn change_username(
    client: &ApiClient,
    new_username: &str,
    password: Option<&str>,
) -> AppResult<String> {
    let username = validate_username(new_username)?;
    require_login(client)?;

    let mut payload = json!({ "new_username": username });
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        payload["password"] = Value::String(password.to_string());
    }
    let response = client
        .send(ApiRequest::post(CHANGE_USERNAME_PATH).json(&payload)?)
        .await?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: response read failed: {e}"))?;
    if !status.is_success() {
        let message = field_error_message(&body, "new_username")
            .or_else(|| field_error_message(&body, "password"))
            .or_else(|| server_error_message(&body))
            .unwrap_or_else(|| "username change failed".to_string());
        return Err(AppError::new(format!("HTTP_{}", status.as_u16()), message));
    }

    let updated = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| first_present(&v, &[&["username"]]))
        .unwrap_or(username);
    tracing::info!(username = %updated, "username changed");
    Ok(updated)
}

/// Usernames registered to an email/password pair. Any server-side failure
/// yields an empty list.
pub async fn forgot_username(
    client: &ApiClient,
    email: &str,
    password: &str,
) -> AppResult<Vec<String>> {
    let email = require_non_empty(email, "email")?;
    if password.is_empty() {
        return Err("SEC_INVALID_INPUT: password is required".to_string().into());
    }

    #[derive(Deserialize)]
    struct Found {
        #[serde(default)]
        usernames: Vec<String>,
    }

    let request = ApiRequest::post(USERNAME_LOOKUP_PATH)
        .json(&json!({ "email": email, "password": password }))?;
    let response = client.send_unauthenticated(request).await?;
    match read_json::<Found>(response).await {
        Ok(found) => Ok(found.usernames),
        Err(err) if err.http_status().is_some() => {
            tracing::debug!("username lookup rejected: {}", err);
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PasswordResetTicket {
    pub uid: String,
    pub token: String,
}

pub async fn issue_password_reset(
    client: &ApiClient,
    username: &str,
    email: &str,
) -> AppResult<PasswordResetTicket> {
    let username = require_non_empty(username, "username")?;
    let email = require_non_empty(email, "email")?;
    let request = ApiRequest::post(PASSWORD_RESET_ISSUE_PATH)
        .json(&json!({ "username": username, "email": email }))?;
    read_json(client.send_unauthenticated(request).await?).await
}

/// Set a new password with a reset ticket. Returns the server's confirmation text.
pub async fn confirm_password_reset(
    client: &ApiClient,
    ticket: &PasswordResetTicket,
    password1: &str,
    password2: &str,
) -> AppResult<String> {
    require_non_empty(&ticket.uid, "reset uid")?;
    require_non_empty(&ticket.token, "reset token")?;
    if password1.is_empty() || password2.is_empty() {
        return Err("SEC_INVALID_INPUT: password is required".to_string().into());
    }
    if password1 != password2 {
        return Err("SEC_INVALID_INPUT: passwords do not match".to_string().into());
    }

    let request = ApiRequest::post(PASSWORD_RESET_CONFIRM_PATH).json(&json!({
        "uid": ticket.uid.trim(),
        "token": ticket.token.trim(),
        "new_password1": password1,
        "new_password2": password2,
    }))?;
    let body = read_text(client.send_unauthenticated(request).await?).await?;
    Ok(serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| first_present(&v, &[&["detail"]]))
        .unwrap_or_else(|| "password has been changed".to_string()))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
    pub agree_terms: bool,
    pub agree_marketing: bool,
    pub policy_version: String,
}

impl RegistrationForm {
    fn validate(&self) -> AppResult<()> {
        require_non_empty(&self.username, "username")?;
        if self.password1.is_empty() || self.password2.is_empty() {
            return Err("SEC_INVALID_INPUT: password is required".to_string().into());
        }
        if self.password1 != self.password2 {
            return Err("SEC_INVALID_INPUT: passwords do not match".to_string().into());
        }
        if !self.agree_terms {
            return Err(
                "SEC_INVALID_INPUT: terms of service and privacy policy must be accepted"
                    .to_string()
                    .into(),
            );
        }
        Ok(())
    }
}

pub async fn register(client: &ApiClient, form: &RegistrationForm) -> AppResult<()> {
    form.validate()?;
    let request = ApiRequest::post(REGISTER_PATH).json(&json!({
        "username": form.username.trim(),
        "email": form.email.trim(),
        "password1": form.password1,
        "password2": form.password2,
        "agree_terms": form.agree_terms,
        "agree_privacy": form.agree_terms,
        "agree_marketing": form.agree_marketing,
        "policy_version": form.policy_version,
    }))?;
    read_text(client.send_unauthenticated(request).await?).await?;
    tracing::info!(username = form.username.trim(), "account registered");
    Ok(())
}
