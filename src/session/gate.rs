//! Authentication gate.
//!
//! A request is authenticated when its session holds a `user_id`. Protected
//! handlers either take [`Authenticated`] as an argument or sit behind
//! [`require_auth_middleware`]; anonymous requests are redirected to the
//! login page and the handler never runs.
//!
//! Login and logout are the application's business: they write or clear
//! `user_id` through the [`Session`] handle. The gate only reads.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::observability::metrics;
use crate::session::{Session, SessionAccess, SessionError};

/// Session key written by login and read by the gate.
pub const USER_ID_KEY: &str = "user_id";

/// Whether the current session carries a logged-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

/// Decides whether a session is authenticated.
#[derive(Debug, Clone)]
pub struct SessionGate {
    login_path: Arc<str>,
}

impl SessionGate {
    /// Create a gate redirecting anonymous requests to `login_path`.
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: Arc::from(login_path.into()),
        }
    }

    /// Where anonymous requests are sent.
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Any present `user_id` counts, including an empty string.
    pub async fn is_authenticated(&self, session: &impl SessionAccess) -> Result<bool, SessionError> {
        Ok(session.get(USER_ID_KEY).await?.is_some())
    }

    /// Classify the session.
    pub async fn state(&self, session: &impl SessionAccess) -> Result<AuthState, SessionError> {
        Ok(if self.is_authenticated(session).await? {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        })
    }

    /// `Ok(())` for authenticated sessions; otherwise the rejection the
    /// caller must return instead of running its handler.
    pub async fn require_authenticated(
        &self,
        session: &impl SessionAccess,
    ) -> Result<(), GateRejection> {
        self.authenticated_user(session).await.map(|_| ())
    }

    /// Like [`require_authenticated`](Self::require_authenticated), handing
    /// back the stored `user_id`.
    pub async fn authenticated_user(
        &self,
        session: &impl SessionAccess,
    ) -> Result<String, GateRejection> {
        match session.get(USER_ID_KEY).await? {
            Some(user_id) => Ok(user_id),
            None => {
                metrics::record_auth_redirect();
                Err(GateRejection::Redirect(AuthRedirect {
                    location: self.login_path.clone(),
                }))
            }
        }
    }
}

/// Redirect to the login page, returned in place of a protected response.
#[derive(Debug, Clone)]
pub struct AuthRedirect {
    location: Arc<str>,
}

impl AuthRedirect {
    /// Target of the redirect.
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        Redirect::to(&self.location).into_response()
    }
}

/// Why a protected request did not reach its handler.
#[derive(Debug)]
pub enum GateRejection {
    Redirect(AuthRedirect),
    /// No session was bound to the request; the middleware stack is
    /// misassembled.
    MissingSession,
    /// The session store failed while reading.
    Store(SessionError),
}

impl From<SessionError> for GateRejection {
    fn from(err: SessionError) -> Self {
        GateRejection::Store(err)
    }
}

impl From<AuthRedirect> for GateRejection {
    fn from(redirect: AuthRedirect) -> Self {
        GateRejection::Redirect(redirect)
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            GateRejection::Redirect(redirect) => redirect.into_response(),
            GateRejection::MissingSession => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session unavailable").into_response()
            }
            GateRejection::Store(err) => {
                tracing::error!(error = %err, "Session lookup failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Session unavailable").into_response()
            }
        }
    }
}

async fn gate_check(
    session: Option<&tower_sessions::Session>,
    gate: Option<&SessionGate>,
    path: &str,
) -> Result<String, GateRejection> {
    let (Some(session), Some(gate)) = (session, gate) else {
        tracing::error!(path = %path, "Protected route reached without session layer");
        return Err(GateRejection::MissingSession);
    };

    let session = Session::new(session.clone());
    gate.authenticated_user(&session).await.inspect_err(|rejection| {
        if let GateRejection::Redirect(redirect) = rejection {
            tracing::debug!(
                path = %path,
                location = %redirect.location(),
                "Anonymous request redirected to login"
            );
        }
    })
}

/// Extractor for handlers that require a logged-in user.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = gate_check(
            parts.extensions.get::<tower_sessions::Session>(),
            parts.extensions.get::<SessionGate>(),
            parts.uri.path(),
        )
        .await?;

        Ok(Authenticated { user_id })
    }
}

/// Route-group form of the gate.
pub async fn require_auth_middleware(request: Request<Body>, next: Next) -> Response {
    // The body is not `Sync`; take what the check needs before awaiting.
    let session = request.extensions().get::<tower_sessions::Session>().cloned();
    let gate = request.extensions().get::<SessionGate>().cloned();
    let path = request.uri().path().to_owned();

    if let Err(rejection) = gate_check(session.as_ref(), gate.as_ref(), &path).await {
        return rejection.into_response();
    }

    next.run(request).await
}
