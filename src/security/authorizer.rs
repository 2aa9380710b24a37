//! Prefix authorization.
//!
//! Rejects every request whose prefix is not whitelisted with a bare
//! `404 Not Found`, so unauthorized callers cannot tell a missing tenant from
//! a missing page.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
};

use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::observability::metrics;
use crate::security::prefixes::AuthorizedPrefixSet;

/// Body sent with every rejection.
pub const REJECTION_BODY: &str = "Not Found";

/// Result of checking one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Accepted(String),
    Rejected,
}

/// Pipeline stage checking the extracted prefix against the whitelist.
#[derive(Debug, Clone)]
pub struct PrefixAuthorizer {
    prefixes: Arc<AuthorizedPrefixSet>,
}

impl PrefixAuthorizer {
    pub fn new(prefixes: Arc<AuthorizedPrefixSet>) -> Self {
        Self { prefixes }
    }

    pub fn authorize(&self, request: &Request<Body>, ctx: &RequestContext) -> Authorization {
        match ctx.mode.extract(request) {
            Some(prefix) if self.prefixes.contains(prefix) => {
                Authorization::Accepted(prefix.to_string())
            }
            _ => Authorization::Rejected,
        }
    }
}

impl Stage for PrefixAuthorizer {
    fn name(&self) -> &'static str {
        "prefix_authorizer"
    }

    fn on_request(&self, request: Request<Body>, ctx: &mut RequestContext) -> Flow {
        match self.authorize(&request, ctx) {
            Authorization::Accepted(prefix) => {
                ctx.prefix = Some(prefix);
                Flow::Continue(request)
            }
            Authorization::Rejected => {
                tracing::info!(
                    request_id = %ctx.id,
                    client = %ctx.client_addr,
                    mode = %ctx.mode,
                    candidate = ctx.mode.extract(&request).unwrap_or("-"),
                    "Prefix not authorized"
                );
                metrics::record_rejected(ctx.mode);
                Flow::Respond((StatusCode::NOT_FOUND, REJECTION_BODY).into_response())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::PrefixMode;

    fn authorizer() -> PrefixAuthorizer {
        PrefixAuthorizer::new(Arc::new(["alpha", "beta"].into_iter().collect()))
    }

    fn ctx(mode: PrefixMode) -> RequestContext {
        RequestContext::new("127.0.0.1:4000".parse().unwrap(), mode)
    }

    #[test]
    fn path_mode_accepts_listed_prefix() {
        let req = Request::builder().uri("/alpha/foo?q=1").body(Body::empty()).unwrap();
        let mut ctx = ctx(PrefixMode::Path);
        assert!(matches!(authorizer().on_request(req, &mut ctx), Flow::Continue(_)));
        assert_eq!(ctx.prefix.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn path_mode_rejects_unlisted_prefix() {
        let req = Request::builder().uri("/gamma/foo").body(Body::empty()).unwrap();
        let mut ctx = ctx(PrefixMode::Path);
        let Flow::Respond(response) = authorizer().on_request(req, &mut ctx) else {
            panic!("expected rejection");
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Not Found");
        assert_eq!(ctx.prefix, None);
    }

    #[test]
    fn root_path_is_rejected() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(
            authorizer().authorize(&req, &ctx(PrefixMode::Path)),
            Authorization::Rejected
        );
    }

    #[test]
    fn host_mode() {
        let a = authorizer();
        let req = Request::builder()
            .uri("/bar")
            .header("Host", "beta.example.com")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            a.authorize(&req, &ctx(PrefixMode::Host)),
            Authorization::Accepted("beta".into())
        );

        let req = Request::builder()
            .uri("/alpha/bar")
            .header("Host", "gamma.example.com")
            .body(Body::empty())
            .unwrap();
        assert_eq!(a.authorize(&req, &ctx(PrefixMode::Host)), Authorization::Rejected);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let req = Request::builder().uri("/ALPHA/x").body(Body::empty()).unwrap();
        assert_eq!(
            authorizer().authorize(&req, &ctx(PrefixMode::Path)),
            Authorization::Rejected
        );
    }
}
