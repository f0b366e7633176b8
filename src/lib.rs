//! Request-entry guard for web applications.
//!
//! Two independent guards run for every request: a protective response
//! header policy, and a session gate that redirects anonymous requests away
//! from protected routes.

pub mod config;
pub mod http;
pub mod net;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod session;

pub use config::schema::GuardConfig;
pub use http::GuardServer;
pub use lifecycle::Shutdown;
