//! Forwarding to the fixed upstream target.
//!
//! # Responsibilities
//! - Rebuild the request URI against the target
//! - Send method, headers and streamed body unchanged
//! - Bound the upstream call with the configured timeout
//! - Stamp `X-Forwarder-By` on every upstream response
//!
//! # Design Decisions
//! - Single target, single attempt; there is no retry path
//! - Bodies stream both ways and are never buffered
//! - Dropping the handler future (client gone) drops the upstream call too
//! - Timeouts map to 504, every other upstream failure to 502

use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{HeaderName, HeaderValue, HOST},
        Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::http::pipeline::RequestContext;
use crate::observability::metrics;

/// Response header added to every successfully forwarded response.
pub const X_FORWARDER_BY: HeaderName = HeaderName::from_static("x-forwarder-by");

/// Value of [`X_FORWARDER_BY`].
pub const FORWARDER_SIGNATURE: &str = "VeryPathly-By-ASLab/0.1";

type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Error type for a forwarding attempt.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("cannot build upstream URI: {0}")]
    Uri(#[from] axum::http::Error),
}

impl ForwardError {
    /// Status returned to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Upstream(_) | ForwardError::Uri(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Upstream(_) => "upstream",
            ForwardError::Uri(_) => "uri",
        }
    }
}

/// Sends authorized requests to the single configured target.
#[derive(Clone)]
pub struct Forwarder {
    client: HttpClient,
    /// `scheme://authority` of the target.
    origin: String,
    /// Target path without its trailing slash; empty for a bare origin.
    base_path: String,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(target: Url, timeout: Duration) -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let origin = match target.port() {
            Some(port) => format!(
                "{}://{}:{}",
                target.scheme(),
                target.host_str().unwrap_or_default(),
                port
            ),
            None => format!("{}://{}", target.scheme(), target.host_str().unwrap_or_default()),
        };
        let base_path = target.path().trim_end_matches('/').to_string();

        Self {
            client,
            origin,
            base_path,
            timeout,
        }
    }

    /// Upstream timeout in force.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forward the request and turn failures into client-facing responses.
    pub async fn forward(&self, request: Request<Body>, ctx: &RequestContext) -> Response {
        match self.send(request, ctx).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %ctx.id, error = %e, "Upstream error");
                metrics::record_upstream_error(e.kind());
                let status = e.status();
                (status, status.canonical_reason().unwrap_or("Upstream Error")).into_response()
            }
        }
    }

    /// Forward the request, surfacing failures as errors.
    pub async fn send(
        &self,
        request: Request<Body>,
        ctx: &RequestContext,
    ) -> Result<Response, ForwardError> {
        let (mut parts, body) = request.into_parts();
        let uri = self.upstream_uri(&parts.uri, &ctx.path_base)?;

        // HTTP/2 clients carry the host in :authority only.
        if !parts.headers.contains_key(HOST) {
            if let Some(host) = parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            {
                parts.headers.insert(HOST, host);
            }
        }

        tracing::debug!(request_id = %ctx.id, upstream = %uri, "Forwarding");
        parts.uri = uri;
        parts.version = Version::HTTP_11;

        let response = tokio::time::timeout(
            self.timeout,
            self.client.request(Request::from_parts(parts, body)),
        )
        .await
        .map_err(|_| ForwardError::Timeout(self.timeout))??;

        let (mut parts, body) = response.into_parts();
        parts
            .headers
            .append(X_FORWARDER_BY, HeaderValue::from_static(FORWARDER_SIGNATURE));
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    /// `origin + target path + path-base + request path + query`.
    pub fn upstream_uri(&self, request_uri: &Uri, path_base: &str) -> Result<Uri, axum::http::Error> {
        let path_and_query = request_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut uri = String::with_capacity(
            self.origin.len() + self.base_path.len() + path_base.len() + path_and_query.len(),
        );
        uri.push_str(&self.origin);
        uri.push_str(&self.base_path);
        uri.push_str(path_base);
        if !path_and_query.starts_with('/') {
            uri.push('/');
        }
        uri.push_str(path_and_query);

        Ok(Uri::try_from(uri)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn forwarder(target: &str) -> Forwarder {
        Forwarder::new(Url::parse(target).unwrap(), Duration::from_secs(5))
    }

    #[test]
    fn uri_keeps_path_and_query() {
        let f = forwarder("http://localhost:2000");
        let uri = f.upstream_uri(&"/foo?q=1".parse().unwrap(), "").unwrap();
        assert_eq!(uri, "http://localhost:2000/foo?q=1");
    }

    #[test]
    fn uri_includes_target_path_and_base() {
        let f = forwarder("https://api.example.com/v1/");
        let uri = f.upstream_uri(&"/foo".parse().unwrap(), "/gw").unwrap();
        assert_eq!(uri, "https://api.example.com/v1/gw/foo");
    }

    #[test]
    fn uri_default_port_is_omitted() {
        let f = forwarder("http://10.0.0.1:80/");
        let uri = f.upstream_uri(&"/".parse().unwrap(), "").unwrap();
        assert_eq!(uri, "http://10.0.0.1/");
    }

    #[test]
    fn uri_from_absolute_form() {
        let f = forwarder("http://127.0.0.1:2000");
        let uri = f
            .upstream_uri(&"http://beta.example.com/bar?x=y".parse().unwrap(), "")
            .unwrap();
        assert_eq!(uri, "http://127.0.0.1:2000/bar?x=y");
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            ForwardError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
