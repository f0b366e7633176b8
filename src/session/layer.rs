//! Cookie-backed session layer.
//!
//! Cookie handling, identifier issuance and idle expiry belong to
//! `tower-sessions`; this module only maps [`SessionConfig`] onto it.

use tower_sessions::cookie::time::Duration;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::SessionConfig;

/// Build the session layer for `store`.
///
/// `secure` marks the cookie `Secure`; pass `true` whenever clients reach the
/// service over HTTPS (TLS listener or a trusted terminating proxy).
pub fn session_layer(
    store: MemoryStore,
    config: &SessionConfig,
    secure: bool,
) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(secure)
        .with_expiry(idle_expiry(config.ttl_secs))
}

/// Idle expiry: every request that touches the session slides it.
pub fn idle_expiry(ttl_secs: u64) -> Expiry {
    Expiry::OnInactivity(Duration::seconds(
        i64::try_from(ttl_secs).unwrap_or(i64::MAX),
    ))
}
