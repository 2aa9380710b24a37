//! Shared utilities for integration testing.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use url::Url;
use very_pathly::config::{PrefixMode, ProxyConfig};
use very_pathly::security::RateLimitGate;
use very_pathly::{HttpServer, Shutdown};

/// A running mock upstream.
pub struct Backend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl Backend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }
}

#[derive(Clone)]
struct EchoState {
    hits: Arc<AtomicUsize>,
    delay: Duration,
}

/// Start a backend that answers every request with a JSON description of
/// what it received, after `delay`.
pub async fn start_echo_backend_with_delay(delay: Duration) -> Backend {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = EchoState {
        hits: hits.clone(),
        delay,
    };
    let app = Router::new().fallback(echo).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Backend { addr, hits }
}

pub async fn start_echo_backend() -> Backend {
    start_echo_backend_with_delay(Duration::ZERO).await
}

async fn echo(State(state): State<EchoState>, request: Request<Body>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let method: Method = request.method().clone();
    let uri: Uri = request.uri().clone();
    let headers: HeaderMap = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap();

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    (
        [("x-upstream", "echo"), ("x-forwarder-by", "upstream-stamp")],
        axum::Json(json!({
            "method": method.as_str(),
            "uri": uri.to_string(),
            "host": header("host"),
            "x_custom": header("x-custom"),
            "body": String::from_utf8_lossy(&body),
        })),
    )
        .into_response()
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn config(target: Url, mode: PrefixMode) -> ProxyConfig {
    ProxyConfig {
        target,
        prefix_mode: mode,
        ..ProxyConfig::default()
    }
}

/// Run the proxy on an ephemeral port.
pub async fn start_proxy(
    config: ProxyConfig,
    prefixes: &[&str],
    gate: Option<RateLimitGate>,
) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config, prefixes.iter().copied().collect(), gate);
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
