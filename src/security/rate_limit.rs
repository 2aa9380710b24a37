//! Per-client rate limiting with fixed windows.
//!
//! # Policy
//!
//! Read from a JSON file with an `IpRateLimiting` section:
//!
//! ```json
//! {
//!   "IpRateLimiting": {
//!     "RealIpHeader": "X-Real-IP",
//!     "HttpStatusCode": 429,
//!     "IpWhitelist": ["127.0.0.1"],
//!     "GeneralRules": [
//!       { "Endpoint": "*", "Period": "1s", "Limit": 5 },
//!       { "Endpoint": "post:/upload", "Period": "1m", "Limit": 10 }
//!     ]
//!   }
//! }
//! ```
//!
//! Every rule whose endpoint matches counts the request. A client is rejected
//! as soon as any of those counters passes its limit within the window.
//!
//! # Concurrency
//!
//! Counters live in a `DashMap` keyed by `(client, rule)`, so contention is
//! limited to one shard lock per key.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header::RETRY_AFTER, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::Deserialize;

use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::observability::metrics;

/// Error type for policy loading.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("cannot read rate limit policy {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rate limit policy: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid period {0:?} (expected e.g. 1s, 5m, 1h, 1d)")]
    InvalidPeriod(String),

    #[error("invalid endpoint {0:?} (expected '*' or '<verb>:<path>')")]
    InvalidEndpoint(String),

    #[error("invalid rejection status code {0}")]
    InvalidStatus(u16),

    #[error("invalid whitelist address {0:?}")]
    InvalidIp(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyFile {
    ip_rate_limiting: RateLimitPolicy,
}

/// Raw policy as written in the JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RateLimitPolicy {
    /// Header carrying the real client IP when behind another proxy.
    pub real_ip_header: Option<String>,
    /// Status used for rejections.
    pub http_status_code: u16,
    /// Client IPs that are never limited.
    pub ip_whitelist: Vec<String>,
    pub general_rules: Vec<RuleConfig>,
    /// Body used for rejections; `{limit}` and `{period}` are substituted.
    pub quota_exceeded_message: Option<String>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            real_ip_header: None,
            http_status_code: 429,
            ip_whitelist: Vec::new(),
            general_rules: Vec::new(),
            quota_exceeded_message: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleConfig {
    pub endpoint: String,
    pub period: String,
    pub limit: u64,
}

const DEFAULT_QUOTA_MESSAGE: &str =
    "API calls quota exceeded! maximum admitted {limit} per {period}.";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    Any,
    Scoped {
        method: Option<Method>,
        /// Lowercased path prefix; `None` matches every path.
        path: Option<String>,
    },
}

impl Endpoint {
    fn parse(raw: &str) -> Result<Self, PolicyError> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Endpoint::Any);
        }
        let (verb, path) = raw
            .split_once(':')
            .ok_or_else(|| PolicyError::InvalidEndpoint(raw.to_string()))?;

        let method = match verb.trim() {
            "*" => None,
            v => Some(
                Method::from_bytes(v.to_ascii_uppercase().as_bytes())
                    .map_err(|_| PolicyError::InvalidEndpoint(raw.to_string()))?,
            ),
        };
        let path = match path.trim().trim_end_matches('*') {
            "" => None,
            p if p.starts_with('/') => Some(p.to_ascii_lowercase()),
            _ => return Err(PolicyError::InvalidEndpoint(raw.to_string())),
        };
        Ok(Endpoint::Scoped { method, path })
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        match self {
            Endpoint::Any => true,
            Endpoint::Scoped { method: m, path: p } => {
                m.as_ref().is_none_or(|m| m == method)
                    && p.as_ref()
                        .is_none_or(|p| path.to_ascii_lowercase().starts_with(p.as_str()))
            }
        }
    }
}

/// Parse `"<n><unit>"` with unit `s`, `m`, `h` or `d`.
pub fn parse_period(raw: &str) -> Result<Duration, PolicyError> {
    let raw = raw.trim();
    let invalid = || PolicyError::InvalidPeriod(raw.to_string());
    let (unit_at, _) = raw.char_indices().last().ok_or_else(invalid)?;
    let (value, unit) = raw.split_at(unit_at);
    let value: u64 = value.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => return Err(invalid()),
    };
    value
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

#[derive(Debug, Clone)]
struct Rule {
    endpoint: Endpoint,
    period: Duration,
    period_label: String,
    limit: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// A rejection decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throttled {
    pub limit: u64,
    pub period: String,
    pub retry_after: Duration,
}

struct GateInner {
    rules: Vec<Rule>,
    whitelist: Vec<IpAddr>,
    real_ip_header: Option<String>,
    status: StatusCode,
    message: String,
    windows: DashMap<(IpAddr, usize), Window>,
}

/// Rate-limit gate run ahead of every other stage.
#[derive(Clone)]
pub struct RateLimitGate {
    inner: Arc<GateInner>,
}

impl RateLimitGate {
    /// Read and compile the policy file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: PolicyFile = serde_json::from_str(&content)?;
        let gate = Self::from_policy(file.ip_rate_limiting)?;

        tracing::info!(
            path = %path.display(),
            rules = gate.inner.rules.len(),
            whitelisted = gate.inner.whitelist.len(),
            "Rate limit policy loaded"
        );
        Ok(gate)
    }

    /// Compile an in-memory policy.
    pub fn from_policy(policy: RateLimitPolicy) -> Result<Self, PolicyError> {
        let rules = policy
            .general_rules
            .iter()
            .map(|r| {
                Ok(Rule {
                    endpoint: Endpoint::parse(&r.endpoint)?,
                    period: parse_period(&r.period)?,
                    period_label: r.period.trim().to_string(),
                    limit: r.limit,
                })
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;

        let whitelist = policy
            .ip_whitelist
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<IpAddr>()
                    .map_err(|_| PolicyError::InvalidIp(ip.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let status = StatusCode::from_u16(policy.http_status_code)
            .map_err(|_| PolicyError::InvalidStatus(policy.http_status_code))?;

        if rules.is_empty() {
            tracing::warn!("Rate limit policy has no rules; every request will be admitted");
        }

        Ok(Self {
            inner: Arc::new(GateInner {
                rules,
                whitelist,
                real_ip_header: policy.real_ip_header.filter(|h| !h.trim().is_empty()),
                status,
                message: policy
                    .quota_exceeded_message
                    .unwrap_or_else(|| DEFAULT_QUOTA_MESSAGE.to_string()),
                windows: DashMap::new(),
            }),
        })
    }

    /// Count one request for `client` and decide whether it may pass.
    pub fn check(
        &self,
        client: IpAddr,
        method: &Method,
        path: &str,
        now: Instant,
    ) -> Result<(), Throttled> {
        if self.inner.whitelist.contains(&client) {
            return Ok(());
        }

        let mut throttled: Option<Throttled> = None;
        for (index, rule) in self.inner.rules.iter().enumerate() {
            if !rule.endpoint.matches(method, path) {
                continue;
            }

            let mut window = self
                .inner
                .windows
                .entry((client, index))
                .or_insert(Window { started: now, count: 0 });
            if now.saturating_duration_since(window.started) >= rule.period {
                *window = Window { started: now, count: 0 };
            }
            window.count += 1;

            if window.count > rule.limit && throttled.is_none() {
                let elapsed = now.saturating_duration_since(window.started);
                throttled = Some(Throttled {
                    limit: rule.limit,
                    period: rule.period_label.clone(),
                    retry_after: rule.period.saturating_sub(elapsed),
                });
            }
        }

        match throttled {
            Some(t) => Err(t),
            None => Ok(()),
        }
    }

    /// Drop windows that have already expired.
    pub fn purge_expired(&self, now: Instant) {
        let rules = &self.inner.rules;
        self.inner.windows.retain(|(_, index), window| {
            rules
                .get(*index)
                .is_some_and(|rule| now.saturating_duration_since(window.started) < rule.period)
        });
    }

    /// Number of live counters.
    pub fn tracked_windows(&self) -> usize {
        self.inner.windows.len()
    }

    /// First address in the real-IP header when it parses, else the peer IP.
    fn client_key(&self, request: &Request<Body>, ctx: &RequestContext) -> IpAddr {
        self.inner
            .real_ip_header
            .as_deref()
            .and_then(|name| request.headers().get(name))
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
            .unwrap_or_else(|| ctx.client_addr.ip())
    }

    fn rejection(&self, throttled: &Throttled) -> Response {
        let body = self
            .inner
            .message
            .replace("{limit}", &throttled.limit.to_string())
            .replace("{period}", &throttled.period);
        let mut response = (self.inner.status, body).into_response();

        let retry_secs = throttled.retry_after.as_secs()
            + u64::from(throttled.retry_after.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_secs.max(1)));
        response
    }
}

impl Stage for RateLimitGate {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn on_request(&self, request: Request<Body>, ctx: &mut RequestContext) -> Flow {
        let client = self.client_key(&request, ctx);
        match self.check(client, request.method(), request.uri().path(), Instant::now()) {
            Ok(()) => Flow::Continue(request),
            Err(throttled) => {
                tracing::warn!(
                    request_id = %ctx.id,
                    client = %client,
                    limit = throttled.limit,
                    period = %throttled.period,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited();
                Flow::Respond(self.rejection(&throttled))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn rule(endpoint: &str, period: &str, limit: u64) -> RuleConfig {
        RuleConfig {
            endpoint: endpoint.into(),
            period: period.into(),
            limit,
        }
    }

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn gate(rules: Vec<RuleConfig>) -> RateLimitGate {
        RateLimitGate::from_policy(RateLimitPolicy {
            general_rules: rules,
            ip_whitelist: vec!["10.0.0.1".into()],
            ..RateLimitPolicy::default()
        })
        .unwrap()
    }

    #[test]
    fn periods() {
        assert_eq!(parse_period("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_period("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_period("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_period("7d").unwrap(), Duration::from_secs(604_800));
        assert!(parse_period("").is_err());
        assert!(parse_period("0s").is_err());
        assert!(parse_period("5w").is_err());
        assert!(parse_period("s").is_err());
    }

    #[test]
    fn endpoints() {
        assert_eq!(Endpoint::parse("*").unwrap(), Endpoint::Any);
        let e = Endpoint::parse("get:/api/*").unwrap();
        assert!(e.matches(&Method::GET, "/API/users"));
        assert!(!e.matches(&Method::POST, "/api/users"));
        assert!(!e.matches(&Method::GET, "/other"));

        let e = Endpoint::parse("*:/upload").unwrap();
        assert!(e.matches(&Method::PUT, "/upload/x"));
        assert!(Endpoint::parse("get").is_err());
        assert!(Endpoint::parse("get:api").is_err());
    }

    #[test]
    fn limit_then_reject_within_window() {
        let g = gate(vec![rule("*", "1s", 2)]);
        let now = Instant::now();
        assert!(g.check(ip("1.2.3.4"), &Method::GET, "/a", now).is_ok());
        assert!(g.check(ip("1.2.3.4"), &Method::GET, "/a", now).is_ok());
        let t = g.check(ip("1.2.3.4"), &Method::GET, "/a", now).unwrap_err();
        assert_eq!(t.limit, 2);
        assert_eq!(t.period, "1s");
        assert_eq!(t.retry_after, Duration::from_secs(1));

        // Other clients are unaffected.
        assert!(g.check(ip("5.6.7.8"), &Method::GET, "/a", now).is_ok());
    }

    #[test]
    fn window_resets() {
        let g = gate(vec![rule("*", "1s", 1)]);
        let now = Instant::now();
        assert!(g.check(ip("1.2.3.4"), &Method::GET, "/", now).is_ok());
        assert!(g.check(ip("1.2.3.4"), &Method::GET, "/", now).is_err());
        let later = now + Duration::from_millis(1001);
        assert!(g.check(ip("1.2.3.4"), &Method::GET, "/", later).is_ok());
    }

    #[test]
    fn whitelisted_clients_pass() {
        let g = gate(vec![rule("*", "1h", 0)]);
        let now = Instant::now();
        assert!(g.check(ip("10.0.0.1"), &Method::GET, "/", now).is_ok());
        assert!(g.check(ip("10.0.0.2"), &Method::GET, "/", now).is_err());
    }

    #[test]
    fn only_matching_rules_count() {
        let g = gate(vec![rule("post:/upload", "1m", 1)]);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(g.check(ip("1.2.3.4"), &Method::GET, "/upload", now).is_ok());
        }
        assert!(g.check(ip("1.2.3.4"), &Method::POST, "/upload", now).is_ok());
        assert!(g.check(ip("1.2.3.4"), &Method::POST, "/upload", now).is_err());
    }

    #[test]
    fn purge_drops_expired_windows() {
        let g = gate(vec![rule("*", "1s", 10)]);
        let now = Instant::now();
        g.check(ip("1.2.3.4"), &Method::GET, "/", now).unwrap();
        g.check(ip("5.6.7.8"), &Method::GET, "/", now).unwrap();
        assert_eq!(g.tracked_windows(), 2);
        g.purge_expired(now);
        assert_eq!(g.tracked_windows(), 2);
        g.purge_expired(now + Duration::from_secs(2));
        assert_eq!(g.tracked_windows(), 0);
    }

    #[test]
    fn policy_json() {
        let json = r#"{
            "IpRateLimiting": {
                "EnableEndpointRateLimiting": false,
                "HttpStatusCode": 503,
                "RealIpHeader": "X-Real-IP",
                "GeneralRules": [ { "Endpoint": "*", "Period": "1s", "Limit": 1 } ]
            }
        }"#;
        let file: PolicyFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.ip_rate_limiting.http_status_code, 503);
        let g = RateLimitGate::from_policy(file.ip_rate_limiting).unwrap();
        assert_eq!(g.inner.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(g.inner.real_ip_header.as_deref(), Some("X-Real-IP"));
    }

    #[test]
    fn invalid_policies() {
        let bad_ip = RateLimitPolicy {
            ip_whitelist: vec!["nope".into()],
            ..RateLimitPolicy::default()
        };
        assert!(matches!(
            RateLimitGate::from_policy(bad_ip),
            Err(PolicyError::InvalidIp(_))
        ));
        let bad_status = RateLimitPolicy {
            http_status_code: 42,
            ..RateLimitPolicy::default()
        };
        assert!(matches!(
            RateLimitGate::from_policy(bad_status),
            Err(PolicyError::InvalidStatus(42))
        ));
        assert!(matches!(
            RateLimitGate::load(Path::new("/nonexistent/ipratelimiting.json")),
            Err(PolicyError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn stage_rejects_with_retry_after() {
        let g = gate(vec![rule("*", "1m", 1)]);
        let mut ctx = RequestContext::new("9.9.9.9:5000".parse().unwrap(), crate::config::PrefixMode::Path);
        let req = || Request::builder().uri("/alpha/x").body(Body::empty()).unwrap();

        assert!(matches!(g.on_request(req(), &mut ctx), Flow::Continue(_)));
        let Flow::Respond(response) = g.on_request(req(), &mut ctx) else {
            panic!("expected rejection");
        };
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "60");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(
            &body[..],
            b"API calls quota exceeded! maximum admitted 1 per 1m."
        );
    }

    #[test]
    fn real_ip_header_keys_clients() {
        let g = RateLimitGate::from_policy(RateLimitPolicy {
            real_ip_header: Some("X-Real-IP".into()),
            general_rules: vec![rule("*", "1m", 1)],
            ..RateLimitPolicy::default()
        })
        .unwrap();
        let ctx = RequestContext::new("127.0.0.1:5000".parse().unwrap(), crate::config::PrefixMode::Path);
        let req = Request::builder()
            .uri("/")
            .header("X-Real-IP", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(g.client_key(&req, &ctx), ip("203.0.113.7"));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(g.client_key(&req, &ctx), ip("127.0.0.1"));
    }

    #[test]
    fn unparsable_real_ip_falls_back_to_peer() {
        let g = RateLimitGate::from_policy(RateLimitPolicy {
            real_ip_header: Some("X-Real-IP".into()),
            general_rules: vec![rule("*", "1d", 1)],
            ..RateLimitPolicy::default()
        })
        .unwrap();
        let mut ctx =
            RequestContext::new("198.51.100.4:5000".parse().unwrap(), crate::config::PrefixMode::Path);

        let mut admitted = 0;
        for i in 0..50 {
            let req = Request::builder()
                .uri("/")
                .header("X-Real-IP", format!("not-an-ip-{i}"))
                .body(Body::empty())
                .unwrap();
            assert_eq!(g.client_key(&req, &ctx), ip("198.51.100.4"));
            if matches!(g.on_request(req, &mut ctx), Flow::Continue(_)) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(g.tracked_windows(), 1);
    }
}
