//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the application router with the guard layers
//! - Wire up ambient middleware (tracing, request ID, timeout, body limit)
//! - Serve over plain TCP or TLS with graceful shutdown bounded by the
//!   configured grace period
//!
//! # Layer order (outermost first)
//! ```text
//! [ConnectionTransport marker, TLS only]
//!     → SetRequestId → Trace → PropagateRequestId
//!     → SecurityHeaders (every response, including timeouts and 413s)
//!     → Timeout → RequestBodyLimit
//!     → SessionGate extension → session layer (tower-sessions)
//!     → application routes
//! ```

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::Extension, http::Request, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GuardConfig;
use crate::net::tls::load_tls_config;
use crate::security::headers::SecurityHeadersLayer;
use crate::security::transport::{ConnectionTransport, Transport};
use crate::session::{session_layer, MemoryStore, SessionGate};

/// Error type for serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error("Failed to load TLS configuration: {0}")]
    Tls(std::io::Error),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The guarded HTTP server.
pub struct GuardServer {
    router: Router,
    config: Arc<GuardConfig>,
    store: MemoryStore,
}

impl GuardServer {
    /// Wrap `app` with the guard layers described by `config`.
    pub fn new(config: GuardConfig, app: Router) -> Self {
        let store = MemoryStore::default();
        let router = Self::build_router(&config, app, store.clone());

        Self {
            router,
            config: Arc::new(config),
            store,
        }
    }

    /// Build the layered router.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, app: Router, store: MemoryStore) -> Router {
        // Cookies are marked Secure whenever clients reach us over HTTPS.
        let secure_cookies =
            config.listener.tls.is_some() || config.security.trust_forwarded_proto;
        let gate = SessionGate::new(config.session.login_path.clone());

        let router = app
            .layer(session_layer(store, &config.session, secure_cookies))
            .layer(Extension(gate))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(SecurityHeadersLayer::new(&config.security))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        if config.listener.tls.is_some() {
            router.layer(Extension(ConnectionTransport(Transport::Secure)))
        } else {
            router
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(self, shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let address = self.config.listener.bind_address.clone();

        match self.config.listener.tls.clone() {
            Some(tls) => {
                let addr: SocketAddr = address.parse().map_err(|e| ServerError::Bind {
                    address: address.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                })?;
                let rustls = load_tls_config(&tls).await.map_err(ServerError::Tls)?;
                self.run_tls(addr, rustls, shutdown).await
            }
            None => {
                let listener = TcpListener::bind(&address)
                    .await
                    .map_err(|source| ServerError::Bind { address, source })?;
                self.run(listener, shutdown).await
            }
        }
    }

    /// Serve plain HTTP on an already bound listener.
    ///
    /// After the shutdown signal, in-flight requests get
    /// `timeouts.shutdown_grace_secs` to finish; the rest are dropped.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            secure_headers = self.config.security.secure_headers_enabled,
            "HTTP server starting"
        );

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let mut drain = shutdown.resubscribe();

        let server = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .into_future();

        tokio::select! {
            result = server => result?,
            _ = async {
                let _ = drain.recv().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Shutdown grace period elapsed, dropping open connections"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    async fn run_tls(
        self,
        addr: SocketAddr,
        rustls: axum_server::tls_rustls::RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(
            address = %addr,
            secure_headers = self.config.security.secure_headers_enabled,
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            shutdown_handle.graceful_shutdown(Some(grace));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// The session store backing this server.
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }

    /// The layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The configuration this server was built from.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use tower::ServiceExt;

    use crate::http::routes::app_router;
    use crate::session::{idle_expiry, USER_ID_KEY};

    fn request(path: &str, cookie: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn logged_in(server: &GuardServer) -> String {
        let session = tower_sessions::Session::new(
            None,
            Arc::new(server.store()),
            Some(idle_expiry(server.config().session.ttl_secs)),
        );
        session.insert(USER_ID_KEY, "42").await.unwrap();
        session.save().await.unwrap();
        format!("guard_session={}", session.id().unwrap())
    }

    #[tokio::test]
    async fn test_anonymous_protected_request_redirects_with_headers() {
        let server = GuardServer::new(GuardConfig::default(), app_router());

        let response = server.router().oneshot(request("/dashboard", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
        assert!(!response.headers().contains_key("strict-transport-security"));
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_route_group_gate_redirects() {
        let server = GuardServer::new(GuardConfig::default(), app_router());

        let response = server.router().oneshot(request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_authenticated_request_reaches_handler() {
        let server = GuardServer::new(GuardConfig::default(), app_router());
        let cookie = logged_in(&server).await;

        let response = server
            .router()
            .oneshot(request("/dashboard", Some(cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Signed in as user 42");
    }

    #[tokio::test]
    async fn test_custom_login_path() {
        let mut config = GuardConfig::default();
        config.session.login_path = "/auth/sign-in".to_string();
        let server = GuardServer::new(config, app_router());

        let response = server.router().oneshot(request("/", None)).await.unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/auth/sign-in");
    }

    #[tokio::test]
    async fn test_tls_listener_marks_requests_secure() {
        let mut config = GuardConfig::default();
        config.listener.tls = Some(crate::config::TlsConfig {
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
        });
        let server = GuardServer::new(config, app_router());

        let response = server.router().oneshot(request("/health", None)).await.unwrap();
        assert_eq!(
            response.headers()["strict-transport-security"],
            "max-age=31536000; includeSubDomains"
        );
    }

    #[tokio::test]
    async fn test_oversized_body_still_gets_headers() {
        let mut config = GuardConfig::default();
        config.limits.max_body_size = 8;
        let app = Router::new().route(
            "/echo",
            axum::routing::post(|body: String| async move { body }),
        );
        let server = GuardServer::new(config, app);

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(header::CONTENT_LENGTH, "32")
                    .body(Body::from("x".repeat(32)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }
}
