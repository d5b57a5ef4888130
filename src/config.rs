//! Command-line and environment configuration
//!
//! Every flag can also be set through the environment variable named next to
//! it. The parsed [`Cli`] is converted once into the plain configuration
//! structs the webhook components take.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use lattice_common::telemetry::{LogFormat, TelemetryConfig};
use lattice_rancher::ResolverConfig;

use crate::error::Error;
use crate::server::{ServerConfig, TlsFiles};
use crate::webhook::namespace::{
    MutationConfig, DEFAULT_PROJECT_ANNOTATION, DEFAULT_PROJECT_LABEL,
};

/// Upper bound for `--cache-ttl`, one week
pub const MAX_CACHE_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Log line format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// One JSON object per line (default)
    #[default]
    Json,
    /// Human-readable text
    Text,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Text => LogFormat::Text,
        }
    }
}

/// Mutating admission webhook that assigns namespaces to Rancher projects
#[derive(Parser, Debug, Clone)]
#[command(name = "project-webhook", version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Base log level (RUST_LOG overrides)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log line format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Json)]
    pub log_format: LogFormatArg,

    /// Deny namespaces whose cluster or project cannot be resolved
    #[arg(long, env = "STRICT_MODE", value_parser = BoolishValueParser::new())]
    pub strict_mode: bool,

    /// Log annotations instead of applying them
    #[arg(long, env = "DRY_RUN", value_parser = BoolishValueParser::new())]
    pub dry_run: bool,

    /// Lifetime of resolved identifiers, in minutes (at most one week)
    #[arg(
        long = "cache-ttl",
        env = "CACHE_TTL_MINUTES",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CACHE_TTL_MINUTES)
    )]
    pub cache_ttl_minutes: u64,

    /// Namespace label naming the project
    #[arg(long, env = "PROJECT_LABEL", default_value = DEFAULT_PROJECT_LABEL, value_parser = non_empty)]
    pub project_label: String,

    /// Annotation receiving `<cluster ID>:<project ID>`
    #[arg(long, env = "PROJECT_ANNOTATION", default_value = DEFAULT_PROJECT_ANNOTATION, value_parser = non_empty)]
    pub project_annotation: String,

    /// PEM certificate to serve TLS with (requires --tls-key-file)
    #[arg(long, env = "TLS_CERT_FILE")]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM private key to serve TLS with (requires --tls-cert-file)
    #[arg(long, env = "TLS_KEY_FILE")]
    pub tls_key_file: Option<PathBuf>,

    /// Path to kubeconfig for the Rancher management cluster (default: in-cluster)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Deadline for one admission request when the API server sends none
    #[arg(
        long,
        env = "REQUEST_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_secs: u64,
}

fn non_empty(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    Ok(s.to_string())
}

impl Cli {
    /// Namespace mutation policy
    pub fn mutation_config(&self) -> MutationConfig {
        MutationConfig {
            strict_mode: self.strict_mode,
            dry_run: self.dry_run,
            project_label: self.project_label.clone(),
            project_annotation: self.project_annotation.clone(),
        }
    }

    /// Lifetime of cached identifiers
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.min(MAX_CACHE_TTL_MINUTES) * 60)
    }

    /// Resolver tuning; retry policy and attempt timeout are fixed
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
    }

    /// Default per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Logging and OTLP export settings
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level.clone(),
            log_format: self.log_format.into(),
            ..Default::default()
        }
    }

    /// Listener settings. TLS needs both files or neither.
    pub fn server_config(&self) -> Result<ServerConfig, Error> {
        let tls = match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert_file), Some(key_file)) => Some(TlsFiles {
                cert_file: cert_file.clone(),
                key_file: key_file.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::config(
                    "--tls-cert-file and --tls-key-file must be set together",
                ))
            }
        };

        Ok(ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], self.port)),
            tls,
        })
    }
}
