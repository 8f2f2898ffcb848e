//! Client for the working-holiday community forum API.
//!
//! [`ApiClient`] attaches the stored access token to every request and, on a
//! `401`, runs one refresh exchange shared by every request that failed in the
//! meantime before replaying them. Account flows live in [`auth::account`],
//! board resources in [`forum`].

pub mod auth;
pub mod forum;
pub mod http;
pub mod infra;
mod shared;

pub use auth::session_manager::SessionManager;
pub use auth::token_store::{FileTokenStore, MemoryTokenStore, SessionTokens, TokenKey, TokenStore};
pub use auth::AuthEvent;
pub use http::client::ApiClient;
pub use http::request::ApiRequest;
pub use infra::settings::ClientSettings;
pub use shared::error::{AppError, AppResult};
