//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router around the request pipeline
//! - Serve HTTP/1.1 and HTTP/2, plain or over rustls
//! - Recover the client address for the pipeline
//! - Drain in-flight requests on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::forward::Forwarder;
use crate::http::pipeline::Pipeline;
use crate::security::{AuthorizedPrefixSet, RateLimitGate};

/// How long TLS connections get to finish after shutdown is requested.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How often expired rate-limit windows are dropped.
const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
    rate_limiter: Option<RateLimitGate>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(
        config: ProxyConfig,
        prefixes: AuthorizedPrefixSet,
        rate_limiter: Option<RateLimitGate>,
    ) -> Self {
        let forwarder = Forwarder::new(config.target.clone(), config.timeouts.request);
        let pipeline = Pipeline::from_config(
            &config,
            Arc::new(prefixes),
            rate_limiter.clone(),
            forwarder,
        );

        let state = AppState {
            pipeline: Arc::new(pipeline),
        };

        Self {
            router: Self::build_router(state),
            config: Arc::new(config),
            rate_limiter,
        }
    }

    /// Every method and path lands in the pipeline.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for driving the proxy without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve plain HTTP until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target = %self.config.target,
            "HTTP server starting"
        );

        self.spawn_rate_limit_purge(shutdown.resubscribe());
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS until `shutdown` fires.
    pub async fn run_tls(
        self,
        listener: std::net::TcpListener,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target = %self.config.target,
            "HTTPS server starting"
        );

        self.spawn_rate_limit_purge(shutdown.resubscribe());

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::from_tcp_rustls(listener, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn spawn_rate_limit_purge(&self, mut shutdown: broadcast::Receiver<()>) {
        let Some(gate) = self.rate_limiter.clone() else {
            return;
        };
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => gate.purge_expired(Instant::now()),
                    _ = shutdown.recv() => break,
                }
            }
        });
    }
}

/// Hand the request and its peer address to the pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    state.pipeline.handle(request, client_addr).await
}
