//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → [axum::serve or axum-server accept loop]
//!     → tls.rs (optional rustls handshake, HTTP/1.1 + h2 via ALPN)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS material is loaded and checked before the socket is bound
//! - TLS is optional and handled transparently

pub mod tls;

pub use tls::{load_tls_config, TlsError};
