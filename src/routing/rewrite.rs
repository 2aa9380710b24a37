//! Path rewriting.
//!
//! Replaces the first literal occurrence of `/<prefix>/` with `/` in both
//! the request path and the path-base. Only that one occurrence changes; a
//! path that never contains it is left as is (the usual case in host mode).

use axum::body::Body;
use axum::http::{uri::PathAndQuery, Request, StatusCode, Uri};
use axum::response::IntoResponse;

use crate::http::pipeline::{Flow, RequestContext, Stage};

/// Replace the first `/<prefix>/` in `path` with `/`.
pub fn strip_prefix_segment(path: &str, prefix: &str) -> String {
    let needle = format!("/{prefix}/");
    path.replacen(&needle, "/", 1)
}

/// Remainder of `path` under `base`, split at a segment boundary.
///
/// `/gw/x` under `/gw` gives `/x`; `/gw` gives `/`; `/gateway` gives `None`.
pub fn split_path_base<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Same URI with its path replaced and the query kept.
pub fn replace_path(uri: &Uri, path: &str) -> Result<Uri, axum::http::Error> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    Ok(Uri::from_parts(parts)?)
}

/// Pipeline stage applying [`strip_prefix_segment`] with the authorized prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRewriter;

impl Stage for PathRewriter {
    fn name(&self) -> &'static str {
        "path_rewriter"
    }

    fn on_request(&self, mut request: Request<Body>, ctx: &mut RequestContext) -> Flow {
        let Some(prefix) = ctx.prefix.as_deref() else {
            return Flow::Continue(request);
        };

        let path = strip_prefix_segment(request.uri().path(), prefix);
        let path_base = strip_prefix_segment(&ctx.path_base, prefix);

        if path != request.uri().path() {
            match replace_path(request.uri(), &path) {
                Ok(uri) => *request.uri_mut() = uri,
                Err(e) => {
                    tracing::warn!(request_id = %ctx.id, error = %e, "Rewritten path is not a valid URI");
                    return Flow::Respond(StatusCode::BAD_REQUEST.into_response());
                }
            }
        }
        ctx.path_base = path_base;

        Flow::Continue(request)
    }
}
