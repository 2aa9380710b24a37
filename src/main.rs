//! VeryPathly - Very simple URL auth reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!  Client ──▶ [rate limit] ──▶ [cors] ──▶ authorizer ──▶ rewriter ──▶ forwarder ──▶ Target
//!                  │                           │
//!                  ▼                           ▼
//!                 429                     404 Not Found
//! ```

use clap::Parser;

use very_pathly::config::{load_config, Cli};
use very_pathly::lifecycle::{self, Shutdown};
use very_pathly::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    observability::init_logging(cli.log_json);

    tracing::info!("very-pathly v{} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        target = %config.target,
        mode = %config.prefix_mode,
        cors = config.cors_enabled,
        rate_limit = config.rate_limit.enabled,
        request_timeout_secs = config.timeouts.request.as_secs(),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        lifecycle::wait_for_signal().await;
        trigger.trigger();
    });

    if let Err(e) = lifecycle::start(config, &shutdown).await {
        tracing::error!(error = %e, "Startup failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
