//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → matcher.rs (pull the prefix out by path segment or host label)
//!     → [authorizer checks it against the whitelist]
//!     → rewrite.rs (strip `/<prefix>/` from path and path-base)
//! ```
//!
//! # Design Decisions
//! - Extraction and rewriting never block and allocate at most one string
//! - Deterministic: same input always yields the same prefix and path

pub mod matcher;
pub mod rewrite;

pub use matcher::{first_path_segment, leading_host_label};
pub use rewrite::{strip_prefix_segment, PathRewriter};
