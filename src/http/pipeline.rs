//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → [rate limit gate]     (optional)
//!     → [cors annotator]      (optional)
//!     → prefix authorizer
//!     → path rewriter
//!     → forwarder
//! Response
//!     ← on_response of every stage that let the request through, in reverse
//! ```
//!
//! # Design Decisions
//! - Stages are assembled once from the config; no per-request branching on flags
//! - A stage either hands the request on or answers it; answering ends the chain
//! - Per-request state lives in `RequestContext`, passed explicitly

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{body::Body, http::Request, response::Response};
use uuid::Uuid;

use crate::config::{PrefixMode, ProxyConfig};
use crate::http::forward::Forwarder;
use crate::observability::metrics;
use crate::routing::rewrite::{replace_path, split_path_base};
use crate::routing::PathRewriter;
use crate::security::{AuthorizedPrefixSet, CorsAnnotator, PrefixAuthorizer, RateLimitGate};

/// Per-request state threaded through every stage.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id for logs. Never sent upstream.
    pub id: Uuid,
    /// Peer address of the client connection.
    pub client_addr: SocketAddr,
    /// Extraction strategy in force.
    pub mode: PrefixMode,
    /// Prefix accepted by the authorizer.
    pub prefix: Option<String>,
    /// Mount portion of the path, forwarded ahead of the request path.
    pub path_base: String,
}

impl RequestContext {
    pub fn new(client_addr: SocketAddr, mode: PrefixMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_addr,
            mode,
            prefix: None,
            path_base: String::new(),
        }
    }
}

/// Outcome of a stage's request hook.
#[derive(Debug)]
pub enum Flow {
    /// Hand the (possibly modified) request to the next stage.
    Continue(Request<Body>),
    /// Answer the client now; later stages and the forwarder are skipped.
    Respond(Response),
}

/// A unit of the request pipeline.
pub trait Stage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn on_request(&self, request: Request<Body>, ctx: &mut RequestContext) -> Flow;

    /// Runs for every stage whose `on_request` returned `Continue`.
    fn on_response(&self, _response: &mut Response, _ctx: &RequestContext) {}
}

/// Ordered stages plus the terminal forwarder.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    forwarder: Forwarder,
    mode: PrefixMode,
    path_base: Option<String>,
}

impl Pipeline {
    pub fn new(
        stages: Vec<Box<dyn Stage>>,
        forwarder: Forwarder,
        mode: PrefixMode,
        path_base: Option<String>,
    ) -> Self {
        Self {
            stages,
            forwarder,
            mode,
            path_base,
        }
    }

    /// Assemble the stage list described by the config.
    ///
    /// Order is fixed: rate limit, CORS, authorizer, rewriter.
    pub fn from_config(
        config: &ProxyConfig,
        prefixes: Arc<AuthorizedPrefixSet>,
        rate_limiter: Option<RateLimitGate>,
        forwarder: Forwarder,
    ) -> Self {
        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(4);
        if let Some(gate) = rate_limiter {
            stages.push(Box::new(gate));
        }
        if config.cors_enabled {
            stages.push(Box::new(CorsAnnotator));
        }
        stages.push(Box::new(PrefixAuthorizer::new(prefixes)));
        stages.push(Box::new(PathRewriter));

        tracing::info!(
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Pipeline assembled"
        );

        Self::new(stages, forwarder, config.prefix_mode, config.path_base.clone())
    }

    /// Names of the assembled stages, in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one request through the pipeline.
    pub async fn handle(&self, request: Request<Body>, client_addr: SocketAddr) -> Response {
        let start_time = Instant::now();
        let method = request.method().clone();
        let mut ctx = RequestContext::new(client_addr, self.mode);

        tracing::debug!(
            request_id = %ctx.id,
            client = %client_addr,
            method = %method,
            uri = %request.uri(),
            "Request received"
        );

        let request = self.mount(request, &mut ctx);
        let (outcome, passed) = self.run_request_stages(request, &mut ctx);

        let mut response = match outcome {
            Ok(request) => self.forwarder.forward(request, &ctx).await,
            Err(response) => response,
        };

        for stage in self.stages.iter().take(passed).rev() {
            stage.on_response(&mut response, &ctx);
        }

        metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
        tracing::debug!(
            request_id = %ctx.id,
            status = response.status().as_u16(),
            prefix = ctx.prefix.as_deref().unwrap_or("-"),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    fn run_request_stages(
        &self,
        mut request: Request<Body>,
        ctx: &mut RequestContext,
    ) -> (Result<Request<Body>, Response>, usize) {
        for (index, stage) in self.stages.iter().enumerate() {
            match stage.on_request(request, ctx) {
                Flow::Continue(next) => request = next,
                Flow::Respond(response) => {
                    tracing::debug!(request_id = %ctx.id, stage = stage.name(), "Short-circuited");
                    return (Err(response), index);
                }
            }
        }
        (Ok(request), self.stages.len())
    }

    /// Move the configured mount path out of the URI and into the context.
    fn mount(&self, mut request: Request<Body>, ctx: &mut RequestContext) -> Request<Body> {
        let Some(base) = self.path_base.as_deref() else {
            return request;
        };
        let Some(rest) = split_path_base(request.uri().path(), base) else {
            return request;
        };
        match replace_path(request.uri(), rest) {
            Ok(uri) => {
                ctx.path_base = base.to_string();
                *request.uri_mut() = uri;
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.id, error = %e, "Could not split path base");
            }
        }
        request
    }
}
