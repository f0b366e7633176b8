//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → layer.rs (tower-sessions: read cookie, bind the session to the request)
//!     → handler / gate.rs (read `user_id`, redirect when anonymous)
//!     → layer.rs (issue, refresh or remove the cookie)
//! ```
//!
//! # Design Decisions
//! - The gate only sees the `SessionAccess` capability, never the store
//! - Identifiers are issued on first write, so anonymous visitors never
//!   receive a cookie
//! - Unknown or expired identifiers are never adopted

pub mod gate;
pub mod layer;

use std::future::Future;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub use gate::{AuthRedirect, AuthState, Authenticated, GateRejection, SessionGate, USER_ID_KEY};
pub use layer::{idle_expiry, session_layer};
pub use tower_sessions::MemoryStore;

/// Failure of the backing session store.
#[derive(Debug, thiserror::Error)]
#[error("Session store error: {0}")]
pub struct SessionError(#[from] tower_sessions::session::Error);

/// Key/value access to the current request's session.
pub trait SessionAccess {
    /// Read one value. Non-string values are returned in their JSON form.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, SessionError>> + Send;

    /// Write one value, issuing an identifier if the session has none yet.
    fn set(&self, key: &str, value: String)
        -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Remove one value.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Per-request session handle.
#[derive(Debug, Clone)]
pub struct Session {
    inner: tower_sessions::Session,
}

impl Session {
    /// Wrap the handle bound by the session layer.
    pub fn new(inner: tower_sessions::Session) -> Self {
        Self { inner }
    }

    /// Current identifier, if one has been issued.
    pub fn id(&self) -> Option<String> {
        self.inner.id().map(|id| id.to_string())
    }

    /// Invalidate the session (logout). The cookie is removed on the way out.
    pub async fn clear(&self) -> Result<(), SessionError> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Move the session to a fresh identifier, keeping its data. Call after
    /// login so a pre-login identifier cannot be fixed by an attacker.
    pub async fn regenerate(&self) -> Result<(), SessionError> {
        self.inner.cycle_id().await?;
        Ok(())
    }
}

impl SessionAccess for Session {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let value = self.inner.get_value(key).await?;
        Ok(value.map(|v| match v.as_str() {
            Some(s) => s.to_owned(),
            None => v.to_string(),
        }))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), SessionError> {
        if self.inner.id().is_none() {
            crate::observability::metrics::record_session_created();
        }
        self.inner.insert(key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.inner.remove_value(key).await?;
        Ok(())
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<tower_sessions::Session>()
            .cloned()
            .map(Session::new)
            .ok_or_else(|| {
                tracing::error!("Session extractor used without session layer");
                GateRejection::MissingSession
            })
    }
}
