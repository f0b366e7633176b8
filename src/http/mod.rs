//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, guard and ambient layers)
//!     → routes.rs (built-in application routes)
//!     → Send to client
//! ```

pub mod routes;
pub mod server;

pub use server::{GuardServer, ServerError};
