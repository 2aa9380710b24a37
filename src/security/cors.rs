//! Permissive CORS headers.

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderName, HeaderValue, Request,
    },
    response::Response,
};

use crate::http::pipeline::{Flow, RequestContext, Stage};

const CORS_HEADERS: [HeaderName; 4] = [
    ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_CREDENTIALS,
];

/// Adds `*` for the four `Access-Control-Allow-*` headers to every response
/// it sees, leaving any value already present untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsAnnotator;

impl CorsAnnotator {
    pub fn annotate(response: &mut Response) {
        let headers = response.headers_mut();
        for name in CORS_HEADERS {
            headers
                .entry(name)
                .or_insert_with(|| HeaderValue::from_static("*"));
        }
    }
}

impl Stage for CorsAnnotator {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn on_request(&self, request: Request<Body>, _ctx: &mut RequestContext) -> Flow {
        Flow::Continue(request)
    }

    fn on_response(&self, response: &mut Response, _ctx: &RequestContext) {
        Self::annotate(response);
    }
}
