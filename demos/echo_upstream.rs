//! A pretend upstream for trying the proxy by hand.
//!
//! ```text
//! cargo run --example echo_upstream
//! cargo run -- demos/prefixes.csv --use-path
//! curl -i http://127.0.0.1:8080/alpha/hello?x=1
//! ```

use axum::{body::Body, http::Request, Router};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new().fallback(|request: Request<Body>| async move {
        let host = request
            .headers()
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        format!("{} {} (host: {host})\n", request.method(), request.uri())
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], 2000));
    println!("Echo upstream is listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
