//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: prefix file, TLS material and bind errors are fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::{ProxyConfig, RateLimitConfig};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{load_tls_config, TlsError};
use crate::observability::metrics;
use crate::security::{AuthorizedPrefixSet, PrefixLoadError, RateLimitGate};

/// Errors that stop the proxy before it serves a single request.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Prefixes(#[from] PrefixLoadError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Load the rate-limit gate if enabled. Problems disable rate limiting
/// instead of stopping the proxy.
pub fn load_rate_limiter(config: &RateLimitConfig) -> Option<RateLimitGate> {
    if !config.enabled {
        return None;
    }
    match RateLimitGate::load(&config.policy_path) {
        Ok(gate) => Some(gate),
        Err(e) => {
            tracing::error!(error = %e, "Rate limiting disabled: policy could not be loaded");
            None
        }
    }
}

/// Bring the proxy up and serve until `shutdown` fires.
pub async fn start(config: ProxyConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let prefixes = AuthorizedPrefixSet::load(&config.prefix_file)?;
    if prefixes.is_empty() {
        tracing::warn!("Authorized prefix set is empty; every request will be rejected");
    }

    let rate_limiter = load_rate_limiter(&config.rate_limit);

    let tls = match &config.listener.tls {
        Some(tls) => Some(load_tls_config(tls).await?),
        None => None,
    };

    if let Some(addr) = config.observability.metrics_address {
        metrics::init_metrics(addr);
    }

    let address = config.listener.bind_address;
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let server = HttpServer::new(config, prefixes, rate_limiter);
    match tls {
        Some(tls) => {
            server
                .run_tls(listener.into_std()?, tls, shutdown.subscribe())
                .await?
        }
        None => server.run(listener, shutdown.subscribe()).await?,
    }
    Ok(())
}
