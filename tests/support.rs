#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use forum_client::{ApiClient, ClientSettings, MemoryTokenStore, SessionManager, SessionTokens};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub const USERNAME: &str = "kim";
pub const PASSWORD: &str = "correct-horse";

#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// Issue `tok<N>` and accept it from then on.
    Rotate,
    /// Issue a new access token that the API then keeps rejecting.
    IssueUnaccepted,
    /// Reject every refresh token with 401.
    Reject,
    /// Never answer.
    Hang,
}

/// In-process stand-in for the forum API: one valid access token at a time,
/// a refresh endpoint with configurable behavior, and a small post store.
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

struct MockState {
    valid_access: Mutex<String>,
    valid_refresh: Mutex<String>,
    behavior: Mutex<RefreshBehavior>,
    /// When set, the refresh handler waits for one permit before answering.
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    seen: Mutex<Vec<(String, Option<String>)>>,
    posts: Mutex<Vec<Value>>,
    comments: Mutex<Vec<Value>>,
    next_id: AtomicUsize,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            valid_access: Mutex::new("tok1".to_string()),
            valid_refresh: Mutex::new("ref1".to_string()),
            behavior: Mutex::new(RefreshBehavior::Rotate),
            refresh_gate: Mutex::new(None),
            issued: AtomicUsize::new(1),
            refresh_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(100),
        });

        let app = Router::new()
            .route("/api/auth/login/", post(login))
            .route("/api/auth/refresh/", post(refresh))
            .route("/api/auth/logout/", post(logout))
            .route("/api/auth/profile/", get(profile))
            .route("/api/auth/username-lookup/", get(username_lookup).post(forgot_username))
            .route("/api/auth/delete-account/", post(delete_account))
            .route("/api/auth/change-username/", post(change_username))
            .route("/api/auth/register/", post(register))
            .route("/api/auth/social/:provider/", post(social_login))
            .route("/api/posts/", get(list_posts).post(create_post))
            .route(
                "/api/posts/:id/",
                get(get_post).patch(update_post).delete(delete_post),
            )
            .route("/api/comments/", get(list_comments).post(create_comment))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn settings(&self) -> ClientSettings {
        ClientSettings::with_api_base_url(self.api_base())
    }

    /// Client over an in-memory store seeded with `tokens`.
    pub fn client_with(&self, settings: &ClientSettings, tokens: &SessionTokens) -> ApiClient {
        ApiClient::new(
            settings,
            Arc::new(MemoryTokenStore::with_tokens(tokens)),
            Arc::new(SessionManager::new()),
        )
        .expect("client")
    }

    /// Client holding an access token the server no longer accepts.
    pub fn client_with_stale_access(&self) -> ApiClient {
        self.client_with(&self.settings(), &SessionTokens::new("stale", "ref1"))
    }

    pub fn set_behavior(&self, behavior: RefreshBehavior) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    pub fn hold_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.state.refresh_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn expire_access(&self) {
        *self.state.valid_access.lock().unwrap() = "expired-everywhere".to_string();
    }

    pub fn valid_access(&self) -> String {
        self.state.valid_access.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    /// `(path, authorization header)` for every non-refresh request, in arrival order.
    pub fn seen(&self) -> Vec<(String, Option<String>)> {
        self.state.seen.lock().unwrap().clone()
    }

    pub fn seed_post(&self, post: Value) {
        self.state.posts.lock().unwrap().push(post);
    }
}

/// Poll `condition` until it holds; panics after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

type Shared = State<Arc<MockState>>;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn authorize(state: &MockState, path: &str, headers: &HeaderMap) -> Result<(), Response> {
    let header = bearer(headers);
    state
        .seen
        .lock()
        .unwrap()
        .push((path.to_string(), header.clone()));
    let expected = format!("Bearer {}", state.valid_access.lock().unwrap());
    if header.as_deref() == Some(expected.as_str()) {
        return Ok(());
    }
    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid"
        })),
    )
        .into_response())
}

fn token_pair(state: &MockState) -> Value {
    json!({
        "access": state.valid_access.lock().unwrap().clone(),
        "refresh": state.valid_refresh.lock().unwrap().clone(),
    })
}

async fn login(State(state): Shared, Json(body): Json<Value>) -> Response {
    if body["username"] == USERNAME && body["password"] == PASSWORD {
        return Json(token_pair(&state)).into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "No active account found with the given credentials"})),
    )
        .into_response()
}

async fn social_login(
    State(state): Shared,
    Path(provider): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if provider == "google" && body["code"] == "good-code" {
        return Json(token_pair(&state)).into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"detail": "invalid code"})),
    )
        .into_response()
}

async fn refresh(State(state): Shared, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let gate = state.refresh_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }

    let behavior = state.behavior.lock().unwrap().clone();
    match behavior {
        RefreshBehavior::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        RefreshBehavior::Reject => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})),
        )
            .into_response(),
        RefreshBehavior::IssueUnaccepted => {
            Json(json!({ "access": "tok-unaccepted" })).into_response()
        }
        RefreshBehavior::Rotate => {
            if body["refresh"] != *state.valid_refresh.lock().unwrap() {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"detail": "Token is blacklisted", "code": "token_not_valid"})),
                )
                    .into_response();
            }
            let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
            let access = format!("tok{n}");
            *state.valid_access.lock().unwrap() = access.clone();
            Json(json!({ "access": access })).into_response()
        }
    }
}

async fn logout(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, "/auth/logout/", &headers) {
        return denied;
    }
    StatusCode::RESET_CONTENT.into_response()
}

async fn profile(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, "/auth/profile/", &headers) {
        return denied;
    }
    Json(json!({"user": {"id": 7, "username": USERNAME}})).into_response()
}

async fn username_lookup(Query(params): Query<Vec<(String, String)>>) -> Response {
    let taken = params
        .iter()
        .any(|(k, v)| k == "username" && v == USERNAME);
    Json(json!({ "exists": taken })).into_response()
}

async fn forgot_username(Json(body): Json<Value>) -> Response {
    if body["email"] == "kim@example.com" && body["password"] == PASSWORD {
        return Json(json!({ "usernames": [USERNAME] })).into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"errors": {"detail": ["info mismatch"]}})),
    )
        .into_response()
}

async fn delete_account(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = authorize(&state, "/auth/delete-account/", &headers) {
        return denied;
    }
    if body["password"] != PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"password": ["Password is incorrect."]})),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn change_username(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = authorize(&state, "/auth/change-username/", &headers) {
        return denied;
    }
    if body["new_username"] == USERNAME {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"new_username": ["This username is already taken."]})),
        )
            .into_response();
    }
    Json(json!({ "username": body["new_username"] })).into_response()
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["username"] == USERNAME {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"username": ["A user with that username already exists."]})),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(json!({"detail": "created"}))).into_response()
}

async fn list_posts(
    State(state): Shared,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    if let Err(denied) = authorize(&state, "/posts/", &headers) {
        return denied;
    }
    let category = params
        .iter()
        .find(|(k, _)| k == "category")
        .map(|(_, v)| v.clone());
    let posts: Vec<Value> = state
        .posts
        .lock()
        .unwrap()
        .iter()
        .filter(|p| match &category {
            Some(c) => p["category"] == c.as_str(),
            None => true,
        })
        .cloned()
        .collect();
    Json(Value::Array(posts)).into_response()
}

fn find_post(state: &MockState, id: u64) -> Option<Value> {
    state
        .posts
        .lock()
        .unwrap()
        .iter()
        .find(|p| p["id"] == id)
        .cloned()
}

async fn get_post(State(state): Shared, headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if let Err(denied) = authorize(&state, &format!("/posts/{id}/"), &headers) {
        return denied;
    }
    match find_post(&state, id) {
        Some(post) => Json(post).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response(),
    }
}

async fn create_post(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = authorize(&state, "/posts/", &headers) {
        return denied;
    }
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let post = json!({
        "id": id,
        "title": body["title"],
        "content": body["content"],
        "category": body.get("category").cloned().unwrap_or(Value::Null),
        "is_pinned": false,
        "created_at": "2025-08-12T08:12:34Z",
        "author": 7,
        "author_username": USERNAME,
    });
    state.posts.lock().unwrap().push(post.clone());
    (StatusCode::CREATED, Json(post)).into_response()
}

async fn update_post(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = authorize(&state, &format!("/posts/{id}/"), &headers) {
        return denied;
    }
    let mut posts = state.posts.lock().unwrap();
    let Some(post) = posts.iter_mut().find(|p| p["id"] == id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response();
    };
    if let (Some(target), Some(patch)) = (post.as_object_mut(), body.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
    Json(post.clone()).into_response()
}

async fn delete_post(State(state): Shared, headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if let Err(denied) = authorize(&state, &format!("/posts/{id}/"), &headers) {
        return denied;
    }
    let mut posts = state.posts.lock().unwrap();
    let before = posts.len();
    posts.retain(|p| p["id"] != id);
    if posts.len() == before {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_comments(
    State(state): Shared,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    if let Err(denied) = authorize(&state, "/comments/", &headers) {
        return denied;
    }
    let post_id: Option<u64> = params
        .iter()
        .find(|(k, _)| k == "post")
        .and_then(|(_, v)| v.parse().ok());
    let comments: Vec<Value> = state
        .comments
        .lock()
        .unwrap()
        .iter()
        .filter(|c| post_id.is_some_and(|id| c["post"] == id))
        .cloned()
        .collect();
    Json(json!({ "count": comments.len(), "results": comments })).into_response()
}

async fn create_comment(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = authorize(&state, "/comments/", &headers) {
        return denied;
    }
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let comment = json!({
        "id": id,
        "post": body["post"],
        "content": body["content"],
        "author": {"id": 7, "username": USERNAME},
    });
    state.comments.lock().unwrap().push(comment.clone());
    (StatusCode::CREATED, Json(comment)).into_response()
}
