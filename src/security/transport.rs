//! Transport detection.
//!
//! Decides whether a request reached us over HTTPS. Sources, in order:
//! - the listener's own marker (`ConnectionTransport`), set for TLS listeners
//! - `X-Forwarded-Proto`, only when the deployment trusts its proxy
//!
//! The request-target scheme is client-chosen and never consulted: a plain
//! connection may send `GET https://host/ HTTP/1.1`.

use axum::http::{HeaderMap, Request};

/// Header set by reverse proxies carrying the client-facing scheme.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Transport the client used to reach the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Secure,
}

impl Transport {
    /// Whether the client reached us over HTTPS.
    pub fn is_secure(self) -> bool {
        matches!(self, Transport::Secure)
    }

    /// Label used in metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Plain => "plain",
            Transport::Secure => "secure",
        }
    }
}

/// Request extension inserted by the serving listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTransport(pub Transport);

/// Resolves the transport of a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportResolver {
    trust_forwarded_proto: bool,
}

impl TransportResolver {
    /// Create a resolver; `trust_forwarded_proto` enables the proxy header.
    pub fn new(trust_forwarded_proto: bool) -> Self {
        Self {
            trust_forwarded_proto,
        }
    }

    /// Resolve the transport of `request`.
    pub fn resolve<B>(&self, request: &Request<B>) -> Transport {
        self.resolve_from(
            request.extensions().get::<ConnectionTransport>(),
            request.headers(),
        )
    }

    fn resolve_from(
        &self,
        connection: Option<&ConnectionTransport>,
        headers: &HeaderMap,
    ) -> Transport {
        if let Some(ConnectionTransport(Transport::Secure)) = connection {
            return Transport::Secure;
        }

        if self.trust_forwarded_proto && forwarded_https(headers) {
            return Transport::Secure;
        }

        Transport::Plain
    }
}

// Proxy chains append; the first entry is the client-facing hop.
fn forwarded_https(headers: &HeaderMap) -> bool {
    headers
        .get(X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}
