//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client fixed windows, optional)
//!     → cors.rs (response annotation, optional)
//!     → authorizer.rs (prefix against prefixes.rs whitelist)
//!     → Pass to routing rewrite
//! ```
//!
//! # Design Decisions
//! - Fail closed: a request without an authorized prefix never leaves the proxy
//! - Rejections all look alike (404 Not Found)
//! - The whitelist is immutable after startup

pub mod authorizer;
pub mod cors;
pub mod prefixes;
pub mod rate_limit;

pub use authorizer::{Authorization, PrefixAuthorizer, REJECTION_BODY};
pub use cors::CorsAnnotator;
pub use prefixes::{AuthorizedPrefixSet, PrefixLoadError};
pub use rate_limit::{PolicyError, RateLimitGate};
