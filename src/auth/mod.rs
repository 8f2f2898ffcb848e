//! Usage: Session tokens, single-flight refresh, and the account endpoints that create or destroy them.

pub mod account;
pub mod claims;
pub mod refresh;
pub mod session_manager;
pub mod token_store;

/// Token-storage transitions, broadcast by [`crate::ApiClient`] so a UI can
/// switch between signed-in and anonymous state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    AccessRefreshed,
    /// The refresh exchange failed and both tokens were purged.
    SessionExpired { reason: String },
    SignedOut,
}
