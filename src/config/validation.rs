//! Configuration validation.
//!
//! Turns raw command-line values into typed settings. Every check runs and
//! all failures are reported together, so a bad invocation is fixed in one
//! round trip.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use url::{Host, Url};

/// A single semantic problem with the supplied configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {field} URL {value:?}: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("unsupported {field} scheme {scheme:?} (expected http or https)")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("listen host {0:?} is not an IP address")]
    ListenHostNotIp(String),

    #[error("target URL must not carry a query or fragment: {0}")]
    TargetHasQuery(String),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("path base {0:?} must start with '/'")]
    InvalidPathBase(String),
}

/// Parsed listen URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenEndpoint {
    pub address: SocketAddr,
    pub tls: bool,
}

/// Parse the listen URL into a bind address.
///
/// The host must be an IP literal (`localhost` is accepted as loopback). A
/// missing port falls back to the scheme default; port `0` binds an
/// ephemeral port.
pub fn validate_listen(raw: &str) -> Result<ListenEndpoint, ValidationError> {
    let url = parse_url("listen", raw)?;
    let tls = match url.scheme() {
        "http" => false,
        "https" => true,
        other => {
            return Err(ValidationError::UnsupportedScheme {
                field: "listen",
                scheme: other.to_string(),
            })
        }
    };

    let ip = match url.host() {
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
        Some(Host::Domain(d)) if d.eq_ignore_ascii_case("localhost") => {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Some(Host::Domain(d)) => return Err(ValidationError::ListenHostNotIp(d.to_string())),
        None => return Err(ValidationError::ListenHostNotIp(String::new())),
    };
    let port = url.port_or_known_default().unwrap_or(if tls { 443 } else { 80 });

    Ok(ListenEndpoint {
        address: SocketAddr::new(ip, port),
        tls,
    })
}

/// Parse and check the forwarding target.
pub fn validate_target(raw: &str) -> Result<Url, ValidationError> {
    let url = parse_url("target", raw)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme {
            field: "target",
            scheme: url.scheme().to_string(),
        });
    }
    if url.host().is_none() {
        return Err(ValidationError::InvalidUrl {
            field: "target",
            value: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ValidationError::TargetHasQuery(raw.to_string()));
    }
    Ok(url)
}

/// Normalize the optional path base: leading slash required, trailing
/// slashes dropped, `/` on its own means no base.
pub fn validate_path_base(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    if !raw.starts_with('/') {
        return Err(ValidationError::InvalidPathBase(raw.to_string()));
    }
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

pub fn validate_timeout(secs: u64) -> Result<u64, ValidationError> {
    if secs == 0 {
        Err(ValidationError::ZeroTimeout)
    } else {
        Ok(secs)
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ValidationError> {
    Url::parse(raw).map_err(|e| ValidationError::InvalidUrl {
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
