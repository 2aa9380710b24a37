//! Configuration schema definitions.
//!
//! A `ProxyConfig` is assembled once from the command line and then shared
//! read-only for the lifetime of the process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Default listen URL.
pub const DEFAULT_LISTEN_URL: &str = "http://127.0.0.1:8080";

/// Default forwarding target.
pub const DEFAULT_TARGET_URL: &str = "http://127.0.0.1:2000";

/// Default upstream timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default rate-limit policy file, relative to the working directory.
pub const DEFAULT_RATE_LIMIT_POLICY: &str = "ipratelimiting.json";

/// Root configuration for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The single upstream every authorized request is sent to.
    pub target: Url,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Where the prefix is read from.
    pub prefix_mode: PrefixMode,

    /// CSV file holding the authorized prefixes (first column).
    pub prefix_file: PathBuf,

    /// Mount point stripped into the path-base before prefix extraction.
    pub path_base: Option<String>,

    /// Attach permissive CORS headers to every response.
    pub cors_enabled: bool,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            target: default_target(),
            timeouts: TimeoutConfig::default(),
            prefix_mode: PrefixMode::Host,
            prefix_file: PathBuf::new(),
            path_base: None,
            cors_enabled: false,
            rate_limit: RateLimitConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[allow(clippy::expect_used)]
fn default_target() -> Url {
    Url::parse(DEFAULT_TARGET_URL).expect("DEFAULT_TARGET_URL is a valid URL")
}

/// Strategy used to pull the authorization prefix out of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMode {
    /// First path segment, e.g. `/alpha/foo` → `alpha`.
    Path,
    /// Leading Host label, e.g. `alpha.example.com` → `alpha`.
    Host,
}

impl std::fmt::Display for PrefixMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefixMode::Path => write!(f, "path"),
            PrefixMode::Host => write!(f, "host"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Socket address to bind.
    pub bind_address: SocketAddr,

    /// TLS settings; `None` serves plain HTTP.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsConfig {
    /// Generate an in-memory self-signed certificate at startup.
    SelfSigned {
        /// Subject alternative names for the generated certificate.
        hosts: Vec<String>,
    },
    /// Certificate chain and private key read from PEM files.
    Pem {
        /// Path to certificate file (PEM).
        cert_path: PathBuf,
        /// Path to private key file (PEM).
        key_path: PathBuf,
    },
}

/// Timeout configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Upstream request timeout (until the response head arrives).
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Enable the rate-limit gate.
    pub enabled: bool,

    /// JSON policy file consumed by the gate.
    pub policy_path: PathBuf,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy_path: PathBuf::from(DEFAULT_RATE_LIMIT_POLICY),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    /// Emit logs as JSON lines instead of the human-readable format.
    pub log_json: bool,

    /// Prometheus exporter bind address; `None` disables the exporter.
    pub metrics_address: Option<SocketAddr>,
}
