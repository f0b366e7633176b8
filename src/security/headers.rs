//! Protective response headers.
//!
//! # Responsibilities
//! - Attach the fixed protective header set to every response
//! - Add HSTS only when the request arrived over HTTPS
//! - Strip technology-disclosure headers (`X-Powered-By`)
//!
//! # Design Decisions
//! - Values are fixed literals; only the global switch and transport vary
//! - Headers are inserted, not appended, so re-applying is harmless
//! - The policy mutates the response before it is handed back to hyper,
//!   which is always ahead of any body bytes

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};

use crate::config::SecurityConfig;
use crate::observability::metrics;
use crate::security::transport::{Transport, TransportResolver};

pub const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");
pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

pub const FRAME_OPTIONS_VALUE: &str = "SAMEORIGIN";
pub const XSS_PROTECTION_VALUE: &str = "1; mode=block";
pub const CONTENT_TYPE_OPTIONS_VALUE: &str = "nosniff";
pub const REFERRER_POLICY_VALUE: &str = "strict-origin-when-cross-origin";
pub const PERMISSIONS_POLICY_VALUE: &str = "geolocation=(), microphone=(), camera=()";
pub const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// CSP directives in emission order. Some older clients parse positionally.
pub const CSP_DIRECTIVES: [&str; 7] = [
    "default-src 'self'",
    "script-src 'self' 'unsafe-inline' 'unsafe-eval' https://cdnjs.cloudflare.com",
    "style-src 'self' 'unsafe-inline' https://cdnjs.cloudflare.com",
    "img-src 'self' data: https:",
    "font-src 'self' data: https://cdnjs.cloudflare.com",
    "connect-src 'self'",
    "frame-ancestors 'self'",
];

/// The `Content-Security-Policy` value: [`CSP_DIRECTIVES`] joined by `"; "`.
pub const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self'; \
     script-src 'self' 'unsafe-inline' 'unsafe-eval' https://cdnjs.cloudflare.com; \
     style-src 'self' 'unsafe-inline' https://cdnjs.cloudflare.com; \
     img-src 'self' data: https:; \
     font-src 'self' data: https://cdnjs.cloudflare.com; \
     connect-src 'self'; \
     frame-ancestors 'self'";

/// Build the `Content-Security-Policy` value from its directives.
pub fn content_security_policy() -> String {
    CSP_DIRECTIVES.join("; ")
}

/// The protective header set, built once at startup.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    enabled: bool,
    fixed: Vec<(HeaderName, HeaderValue)>,
    hsts: HeaderValue,
}

impl HeaderPolicy {
    /// Build the policy from the security section of the config.
    pub fn new(config: &SecurityConfig) -> Self {
        let fixed = vec![
            (X_FRAME_OPTIONS, HeaderValue::from_static(FRAME_OPTIONS_VALUE)),
            (X_XSS_PROTECTION, HeaderValue::from_static(XSS_PROTECTION_VALUE)),
            (
                X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static(CONTENT_TYPE_OPTIONS_VALUE),
            ),
            (REFERRER_POLICY, HeaderValue::from_static(REFERRER_POLICY_VALUE)),
            (
                CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(CONTENT_SECURITY_POLICY_VALUE),
            ),
            (
                PERMISSIONS_POLICY,
                HeaderValue::from_static(PERMISSIONS_POLICY_VALUE),
            ),
        ];

        Self {
            enabled: config.secure_headers_enabled,
            fixed,
            hsts: HeaderValue::from_static(HSTS_VALUE),
        }
    }

    /// Whether the global switch is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Apply the policy to a response header map.
    pub fn apply(&self, headers: &mut HeaderMap, transport: Transport) {
        if !self.enabled {
            return;
        }

        headers.remove(X_POWERED_BY);

        for (name, value) in &self.fixed {
            headers.insert(name.clone(), value.clone());
        }

        if transport.is_secure() {
            headers.insert(STRICT_TRANSPORT_SECURITY, self.hsts.clone());
        }

        metrics::record_headers_applied(transport);
    }
}

/// Tower layer applying a [`HeaderPolicy`] to every response.
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    policy: Arc<HeaderPolicy>,
    resolver: TransportResolver,
}

impl SecurityHeadersLayer {
    /// Create the layer from the security section of the config.
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            policy: Arc::new(HeaderPolicy::new(config)),
            resolver: TransportResolver::new(config.trust_forwarded_proto),
        }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            policy: self.policy.clone(),
            resolver: self.resolver,
        }
    }
}

#[derive(Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    policy: Arc<HeaderPolicy>,
    resolver: TransportResolver,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SecurityHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let transport = self.resolver.resolve(&req);
        let policy = self.policy.clone();
        let future = self.inner.call(req);

        Box::pin(async move {
            let mut response = future.await?;
            policy.apply(response.headers_mut(), transport);
            Ok(response)
        })
    }
}
