//! Usage: Authenticated API client (bearer injection + single-flight refresh on 401).

use crate::auth::claims::{decode_claims, AccessClaims};
use crate::auth::refresh::exchange_refresh_token_with_timeout;
use crate::auth::session_manager::{RefreshLease, RefreshSlot, ReplayGrant, SessionManager};
use crate::auth::token_store::{FileTokenStore, MemoryTokenStore, TokenKey, TokenStore};
use crate::auth::AuthEvent;
use crate::http::request::ApiRequest;
use crate::http::response::read_json;
use crate::infra::settings::ClientSettings;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const AUTH_EVENT_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    refresh_endpoint: Url,
    refresh_timeout: Duration,
    tokens: Arc<dyn TokenStore>,
    sessions: Arc<SessionManager>,
    events: broadcast::Sender<AuthEvent>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base.as_str())
            .field("refresh_endpoint", &self.refresh_endpoint.as_str())
            .field("refreshing", &self.sessions.is_refreshing())
            .finish_non_exhaustive()
    }
}

fn build_http_client(settings: &ClientSettings) -> AppResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .connect_timeout(Duration::from_secs(u64::from(
            settings.connect_timeout_seconds.max(1),
        )));
    if settings.request_timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(u64::from(
            settings.request_timeout_seconds,
        )));
    }
    builder
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: failed to build http client: {e}").into())
}

impl ApiClient {
    pub fn new(
        settings: &ClientSettings,
        tokens: Arc<dyn TokenStore>,
        sessions: Arc<SessionManager>,
    ) -> AppResult<Self> {
        let base = settings.api_base()?;
        let refresh_endpoint = base
            .join(settings.refresh_path.trim().trim_start_matches('/'))
            .map_err(|e| format!("CONFIG_ERROR: invalid refresh path: {e}"))?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            http: build_http_client(settings)?,
            base,
            refresh_endpoint,
            refresh_timeout: Duration::from_secs(u64::from(settings.refresh_timeout_seconds)),
            tokens,
            sessions,
            events,
        })
    }

    /// Client with its own session manager and the token store named by the
    /// settings (file-backed when `token_file` is set, in-memory otherwise).
    pub fn from_settings(settings: &ClientSettings) -> AppResult<Self> {
        let tokens: Arc<dyn TokenStore> = match settings.token_file.as_ref() {
            Some(path) => Arc::new(FileTokenStore::open(path)?),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Self::new(settings, tokens, Arc::new(SessionManager::new()))
    }

    pub fn api_base(&self) -> &Url {
        &self.base
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        tracing::debug!(event = ?event, "auth event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn is_authenticated(&self) -> AppResult<bool> {
        Ok(self.tokens.access_token()?.is_some())
    }

    /// Claims of the stored access token; `None` when anonymous or undecodable.
    pub fn access_claims(&self) -> AppResult<Option<AccessClaims>> {
        let Some(token) = self.tokens.access_token()? else {
            return Ok(None);
        };
        match decode_claims(&token) {
            Ok(claims) => Ok(Some(claims)),
            Err(err) => {
                tracing::debug!(token = %mask_token(&token), "access token claims unreadable: {err}");
                Ok(None)
            }
        }
    }

    pub fn url_for(&self, request: &ApiRequest) -> AppResult<Url> {
        let mut url = self.base.join(request.relative_path()).map_err(|e| {
            format!("SEC_INVALID_INPUT: invalid request path {:?}: {e}", request.path())
        })?;
        if !request.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_pairs());
        }
        Ok(url)
    }

    fn is_refresh_call(&self, url: &Url) -> bool {
        url.path() == self.refresh_endpoint.path()
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        url: Url,
        access_token: Option<&str>,
    ) -> AppResult<reqwest::Response> {
        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }

        builder.send().await.map_err(|e| {
            format!(
                "SYSTEM_ERROR: {} {} failed: {e}",
                request.method(),
                request.path()
            )
            .into()
        })
    }

    /// Send a request with the stored access token attached.
    ///
    /// Non-2xx statuses are returned as `Ok(response)`. A 401 is intercepted
    /// once: the stored refresh token is exchanged (or the in-flight exchange
    /// awaited) and the request replayed with the new access token. Replays
    /// of one refresh cycle go out one after another in queue order, the
    /// leader first. When the exchange fails, both tokens are purged and the
    /// refresh error is returned.
    pub async fn send(&self, mut request: ApiRequest) -> AppResult<reqwest::Response> {
        let url = self.url_for(&request)?;
        let access = self.tokens.access_token()?;
        let response = self
            .dispatch(&request, url.clone(), access.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED
            || request.is_retried()
            || self.is_refresh_call(&url)
        {
            return Ok(response);
        }
        let Some(refresh_token) = self.tokens.refresh_token()? else {
            return Ok(response);
        };
        drop(response);

        let grant = match self.sessions.acquire() {
            RefreshSlot::Waiter(waiter) => {
                tracing::debug!(
                    method = %request.method(),
                    path = request.path(),
                    "401 while refresh in flight; waiting"
                );
                waiter.wait().await?
            }
            RefreshSlot::Leader(lease) => {
                tracing::debug!(
                    method = %request.method(),
                    path = request.path(),
                    "401 received; refreshing access token"
                );
                request.mark_retried();
                self.refresh_with_lease(lease, &refresh_token).await?
            }
        };

        request.mark_retried();
        let ReplayGrant {
            access_token,
            mut ticket,
        } = grant;
        ticket.wait_turn().await;
        tracing::debug!(
            position = ticket.position(),
            path = request.path(),
            "replaying request with refreshed token"
        );
        let replayed = self.dispatch(&request, url, Some(access_token.as_str())).await;
        ticket.pass();
        replayed
    }

    async fn refresh_with_lease(
        &self,
        lease: RefreshLease<'_>,
        refresh_token: &str,
    ) -> AppResult<ReplayGrant> {
        let cycle = lease.cycle();
        let outcome = exchange_refresh_token_with_timeout(
            &self.http,
            self.refresh_endpoint.clone(),
            refresh_token,
            self.refresh_timeout,
        )
        .await;

        match outcome {
            Ok(refreshed) => {
                if let Err(err) = self.tokens.set(TokenKey::Access, &refreshed.access) {
                    tracing::warn!(cycle, "failed to persist refreshed access token: {}", err);
                }
                if let Some(rotated) = refreshed.refresh.as_deref() {
                    if let Err(err) = self.tokens.set(TokenKey::Refresh, rotated) {
                        tracing::warn!(cycle, "failed to persist rotated refresh token: {}", err);
                    }
                }
                let resolved = lease.resolve(&refreshed.access);
                tracing::info!(
                    cycle,
                    released = resolved.released,
                    access_token = %mask_token(&refreshed.access),
                    "access token refreshed"
                );
                self.emit(AuthEvent::AccessRefreshed);
                Ok(ReplayGrant {
                    access_token: refreshed.access,
                    ticket: resolved.ticket,
                })
            }
            Err(err) => {
                let released = lease.reject(err.clone());
                if let Err(clear_err) = self.tokens.clear() {
                    tracing::warn!(cycle, "failed to purge tokens after refresh failure: {}", clear_err);
                }
                tracing::warn!(cycle, released, "token refresh failed; session cleared: {}", err);
                self.emit(AuthEvent::SessionExpired {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Send without a bearer header and without 401 interception. Used by the
    /// login flows, where a 401 means bad credentials rather than an expired token.
    pub async fn send_unauthenticated(&self, request: ApiRequest) -> AppResult<reqwest::Response> {
        let url = self.url_for(&request)?;
        self.dispatch(&request, url, None).await
    }

    /// [`send`](Self::send), then decode a 2xx JSON body; other statuses
    /// become `HTTP_<status>` errors.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> AppResult<T> {
        let response = self.send(request).await?;
        read_json(response).await
    }

    /// [`send`](Self::send) for endpoints whose success body is irrelevant.
    pub async fn send_expect_success(&self, request: ApiRequest) -> AppResult<()> {
        let response = self.send(request).await?;
        crate::http::response::read_text(response).await.map(|_| ())
    }
}
