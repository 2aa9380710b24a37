//! Command-line interface.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{
    DEFAULT_LISTEN_URL, DEFAULT_RATE_LIMIT_POLICY, DEFAULT_TARGET_URL, DEFAULT_TIMEOUT_SECS,
};

/// VeryPathly - Very simple URL auth reverse proxy.
#[derive(Debug, Clone, Parser)]
#[command(name = "very-pathly", version, arg_required_else_help = true)]
pub struct Cli {
    /// Authorized prefix CSV (first column)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Server listening address and port
    #[arg(short, long, value_name = "URL", default_value = DEFAULT_LISTEN_URL)]
    pub listen: String,

    /// Target address and port
    #[arg(short, long, value_name = "URL", default_value = DEFAULT_TARGET_URL)]
    pub target: String,

    /// Enable HTTPS (self-signed unless a PEM pair is given, not recommended)
    #[arg(short = 's', long)]
    pub https: bool,

    /// PEM certificate file
    #[arg(long = "pem-file", visible_alias = "pem", value_name = "FILE", requires = "key_file")]
    pub pem_file: Option<PathBuf>,

    /// PEM certificate key file
    #[arg(long = "key-file", visible_alias = "key", value_name = "FILE", requires = "pem_file")]
    pub key_file: Option<PathBuf>,

    /// Enable CORS
    #[arg(short, long)]
    pub cors: bool,

    /// Use path prefix instead of host prefix (host prefix is the default)
    #[arg(long)]
    pub use_path: bool,

    /// Enable request rate limiting
    #[arg(long)]
    pub use_rate_limit: bool,

    /// Rate limiting policy file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_RATE_LIMIT_POLICY)]
    pub rate_limit_config: PathBuf,

    /// Request timeout in seconds
    #[arg(short = 'o', long, value_name = "SECONDS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Mount path split off into the path-base before prefix matching
    #[arg(long, value_name = "PATH")]
    pub path_base: Option<String>,

    /// Expose Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    pub metrics_listen: Option<SocketAddr>,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}
