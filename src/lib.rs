//! VeryPathly: a prefix-authorizing reverse proxy.
//!
//! Each request's prefix (first path segment or leading Host label) is
//! checked against a whitelist loaded at startup. Authorized requests have
//! `/<prefix>/` stripped from their path and are forwarded to one fixed
//! upstream; everything else gets `404 Not Found`.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::AuthorizedPrefixSet;
