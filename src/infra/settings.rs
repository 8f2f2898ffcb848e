//! Usage: Client settings (schema, TOML loading, env overrides, sanitizing).

use crate::shared::error::AppResult;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_BACKEND_ORIGIN: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh/";
pub const DEFAULT_REFRESH_TIMEOUT_SECONDS: u32 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u32 = 0;
const MAX_REFRESH_TIMEOUT_SECONDS: u32 = 10 * 60;
const MAX_CONNECT_TIMEOUT_SECONDS: u32 = 5 * 60;
const MAX_REQUEST_TIMEOUT_SECONDS: u32 = 60 * 60;
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_LOG_FILE_PREFIX: &str = "forum-client.log";

pub const ENV_API_BASE_URL: &str = "FORUM_API_BASE_URL";
pub const ENV_BACKEND_ORIGIN: &str = "FORUM_BACKEND_ORIGIN";
pub const ENV_REFRESH_TIMEOUT_SECONDS: &str = "FORUM_REFRESH_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT_SECONDS: &str = "FORUM_REQUEST_TIMEOUT_SECS";
pub const ENV_TOKEN_FILE: &str = "FORUM_TOKEN_FILE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    // EnvFilter directive; `FORUM_CLIENT_LOG` wins when set.
    pub filter: String,
    // Daily-rolling log files are written here when set.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    // API origin + prefix, e.g. `http://localhost:8000/api`.
    pub api_base_url: String,
    // Origin used for browser-side social login entry points (`/accounts/...`).
    pub backend_origin: String,
    pub refresh_path: String,
    // 0 disables the refresh timeout.
    pub refresh_timeout_seconds: u32,
    pub connect_timeout_seconds: u32,
    // 0 disables the per-request timeout.
    pub request_timeout_seconds: u32,
    // Durable token storage; in-memory storage is used when unset.
    pub token_file: Option<PathBuf>,
    pub user_agent: String,
    pub log: LogSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            backend_origin: DEFAULT_BACKEND_ORIGIN.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            refresh_timeout_seconds: DEFAULT_REFRESH_TIMEOUT_SECONDS,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            token_file: None,
            user_agent: format!("forum-client/{}", env!("CARGO_PKG_VERSION")),
            log: LogSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn with_api_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// API base as a URL that always ends in `/`, so relative joins keep the prefix.
    pub fn api_base(&self) -> AppResult<Url> {
        normalize_base_url(&self.api_base_url)
    }

    pub fn backend_origin_url(&self) -> AppResult<Url> {
        normalize_base_url(&self.backend_origin)
    }

    pub fn apply_env_overrides(&mut self) -> bool {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut changed = false;

        if let Some(v) = read(ENV_API_BASE_URL) {
            self.api_base_url = v;
            changed = true;
        }
        if let Some(v) = read(ENV_BACKEND_ORIGIN) {
            self.backend_origin = v;
            changed = true;
        }
        if let Some(v) = read(ENV_TOKEN_FILE) {
            self.token_file = Some(PathBuf::from(v));
            changed = true;
        }
        for (key, slot) in [
            (ENV_REFRESH_TIMEOUT_SECONDS, &mut self.refresh_timeout_seconds),
            (ENV_REQUEST_TIMEOUT_SECONDS, &mut self.request_timeout_seconds),
        ] {
            let Some(raw) = read(key) else {
                continue;
            };
            match raw.parse::<u32>() {
                Ok(v) => {
                    *slot = v;
                    changed = true;
                }
                Err(err) => tracing::warn!(key, value = %raw, "ignoring invalid override: {err}"),
            }
        }

        changed
    }
}

fn normalize_base_url(raw: &str) -> AppResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("CONFIG_ERROR: base url is empty".to_string().into());
    }
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| format!("CONFIG_ERROR: invalid base url {trimmed:?}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("CONFIG_ERROR: unsupported base url scheme {:?}", url.scheme()).into());
    }
    Ok(url)
}

fn sanitize_timeouts(settings: &mut ClientSettings) -> bool {
    let mut changed = false;

    if settings.refresh_timeout_seconds > MAX_REFRESH_TIMEOUT_SECONDS {
        settings.refresh_timeout_seconds = MAX_REFRESH_TIMEOUT_SECONDS;
        changed = true;
    }
    if settings.connect_timeout_seconds == 0 {
        settings.connect_timeout_seconds = DEFAULT_CONNECT_TIMEOUT_SECONDS;
        changed = true;
    }
    if settings.connect_timeout_seconds > MAX_CONNECT_TIMEOUT_SECONDS {
        settings.connect_timeout_seconds = MAX_CONNECT_TIMEOUT_SECONDS;
        changed = true;
    }
    if settings.request_timeout_seconds > MAX_REQUEST_TIMEOUT_SECONDS {
        settings.request_timeout_seconds = MAX_REQUEST_TIMEOUT_SECONDS;
        changed = true;
    }

    changed
}

fn sanitize_paths(settings: &mut ClientSettings) -> bool {
    let trimmed = settings.refresh_path.trim();
    if trimmed.is_empty() {
        settings.refresh_path = DEFAULT_REFRESH_PATH.to_string();
        return true;
    }
    if trimmed != settings.refresh_path {
        settings.refresh_path = trimmed.to_string();
        return true;
    }
    false
}

pub fn sanitize(settings: &mut ClientSettings) -> bool {
    let timeouts = sanitize_timeouts(settings);
    let paths = sanitize_paths(settings);
    timeouts || paths
}

pub fn parse_settings_toml(content: &str) -> AppResult<ClientSettings> {
    toml::from_str(content).map_err(|e| format!("CONFIG_ERROR: failed to parse settings: {e}").into())
}

/// Read settings from an optional TOML file, then apply env overrides and sanitizing.
///
/// A missing file is not an error; defaults are used instead.
pub fn load(path: Option<&Path>) -> AppResult<ClientSettings> {
    let mut settings = match path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                format!("CONFIG_ERROR: failed to read {}: {e}", path.display())
            })?;
            parse_settings_toml(&content)?
        }
        Some(path) => {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
            ClientSettings::default()
        }
        None => ClientSettings::default(),
    };

    settings.apply_env_overrides();
    if sanitize(&mut settings) {
        tracing::warn!("client settings were out of range and have been adjusted");
    }
    settings.api_base()?;
    Ok(settings)
}
