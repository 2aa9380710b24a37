//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! argv
//!     → cli.rs (clap parse)
//!     → validation.rs (URL, timeout and path-base checks)
//!     → loader.rs (assemble)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once built; there is no reload path
//! - Validation reports every problem, not just the first

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, ConfigError};
pub use schema::{
    ListenerConfig, ObservabilityConfig, PrefixMode, ProxyConfig, RateLimitConfig, TimeoutConfig,
    TlsConfig,
};
