//! Built-in application routes served by the binary.
//!
//! Public: `/health`, `/login`. Protected: `/` (route-group gate) and
//! `/dashboard` (extractor gate). `/logout` ends the session.

use axum::{
    extract::Extension,
    middleware,
    response::{Html, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::session::gate::require_auth_middleware;
use crate::session::{Authenticated, GateRejection, Session, SessionGate};

/// Body of `/health`.
#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

/// The binary's own routes, to be wrapped by [`GuardServer`](crate::GuardServer).
pub fn app_router() -> Router {
    let protected = Router::new()
        .route("/", get(home))
        .route_layer(middleware::from_fn(require_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/login", get(login_page))
        .route("/logout", post(logout))
        .route("/dashboard", get(dashboard))
        .merge(protected)
}

/// Liveness probe; public.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

async fn login_page() -> Html<&'static str> {
    Html("<!doctype html><title>Sign in</title><h1>Sign in</h1>")
}

async fn home() -> Html<&'static str> {
    Html("<!doctype html><title>Home</title><h1>Welcome back</h1>")
}

async fn dashboard(user: Authenticated) -> String {
    format!("Signed in as user {}", user.user_id)
}

async fn logout(
    Extension(gate): Extension<SessionGate>,
    session: Session,
) -> Result<Redirect, GateRejection> {
    session.clear().await?;
    Ok(Redirect::to(gate.login_path()))
}
