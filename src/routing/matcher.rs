//! Prefix extraction.
//!
//! # Design Decisions
//! - Path mode reads the raw (still percent-encoded) path
//! - Host mode keeps any `:port` suffix when the host has no dot
//! - No normalization: the whitelist is matched verbatim

use axum::body::Body;
use axum::http::{header::HOST, Request};

use crate::config::PrefixMode;

impl PrefixMode {
    /// Pull the candidate prefix out of a request, if there is one.
    pub fn extract<'a>(&self, req: &'a Request<Body>) -> Option<&'a str> {
        match self {
            PrefixMode::Path => first_path_segment(req.uri().path()),
            PrefixMode::Host => request_host(req).map(leading_host_label),
        }
    }
}

/// First segment of a path after its leading slashes; `None` for `/` or "".
pub fn first_path_segment(path: &str) -> Option<&str> {
    let trimmed = path.trim_start_matches('/');
    let segment = trimmed.split('/').next().unwrap_or_default();
    (!segment.is_empty()).then_some(segment)
}

/// Text before the first `.`; the whole host when it has none.
pub fn leading_host_label(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

/// Host header, falling back to the URI authority (HTTP/2).
fn request_host(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
}
