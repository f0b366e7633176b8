//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → transport.rs (plain or secure?)
//!     → [session and application handling]
//!     → headers.rs (protective header set, HSTS on secure transport)
//! ```
//!
//! # Design Decisions
//! - Header policy never looks at session state
//! - Forwarded-protocol headers are ignored unless explicitly trusted

pub mod headers;
pub mod transport;

pub use headers::{HeaderPolicy, SecurityHeadersLayer};
pub use transport::{ConnectionTransport, Transport, TransportResolver};
