//! Builds the runtime configuration from the parsed command line.

use std::time::Duration;

use crate::config::cli::Cli;
use crate::config::schema::{
    ListenerConfig, ObservabilityConfig, PrefixMode, ProxyConfig, RateLimitConfig, TimeoutConfig,
    TlsConfig,
};
use crate::config::validation::{
    validate_listen, validate_path_base, validate_target, validate_timeout, ValidationError,
};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate the command line and assemble an immutable `ProxyConfig`.
pub fn load_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut errors = Vec::new();

    let listen = validate_listen(&cli.listen).map_err(|e| errors.push(e)).ok();
    let target = validate_target(&cli.target).map_err(|e| errors.push(e)).ok();
    let timeout = validate_timeout(cli.timeout).map_err(|e| errors.push(e)).ok();
    let path_base = validate_path_base(cli.path_base.as_deref())
        .map_err(|e| errors.push(e))
        .ok();

    let (Some(listen), Some(target), Some(timeout), Some(path_base)) =
        (listen, target, timeout, path_base)
    else {
        return Err(ConfigError::Validation(errors));
    };

    let tls = match (&cli.pem_file, &cli.key_file) {
        (Some(cert), Some(key)) => Some(TlsConfig::Pem {
            cert_path: cert.clone(),
            key_path: key.clone(),
        }),
        _ if cli.https || listen.tls => Some(TlsConfig::SelfSigned {
            hosts: self_signed_hosts(&listen.address),
        }),
        _ => None,
    };

    Ok(ProxyConfig {
        listener: ListenerConfig {
            bind_address: listen.address,
            tls,
        },
        target,
        timeouts: TimeoutConfig {
            request: Duration::from_secs(timeout),
        },
        prefix_mode: if cli.use_path {
            PrefixMode::Path
        } else {
            PrefixMode::Host
        },
        prefix_file: cli.file.clone(),
        path_base,
        cors_enabled: cli.cors,
        rate_limit: RateLimitConfig {
            enabled: cli.use_rate_limit,
            policy_path: cli.rate_limit_config.clone(),
        },
        observability: ObservabilityConfig {
            log_json: cli.log_json,
            metrics_address: cli.metrics_listen,
        },
    })
}

fn self_signed_hosts(addr: &std::net::SocketAddr) -> Vec<String> {
    let mut hosts = vec!["localhost".to_string()];
    if !addr.ip().is_unspecified() {
        hosts.push(addr.ip().to_string());
    }
    hosts
}
