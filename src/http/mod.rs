//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, protocol detection, client address)
//!     → pipeline.rs (ordered stages, per-request context)
//!     → forward.rs (upstream call, timeout, response stamping)
//!     → Send to client
//! ```

pub mod forward;
pub mod pipeline;
pub mod server;

pub use forward::{ForwardError, Forwarder, FORWARDER_SIGNATURE, X_FORWARDER_BY};
pub use pipeline::{Flow, Pipeline, RequestContext, Stage};
pub use server::HttpServer;
