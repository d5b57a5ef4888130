//! Error types for the project webhook process

use thiserror::Error;

/// Errors that stop the webhook from starting or serving
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging or OTLP export could not be initialized
    #[error("telemetry error: {0}")]
    Telemetry(#[from] lattice_common::telemetry::TelemetryError),

    /// Kubernetes client could not be built
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Certificate or key could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// Listener or signal handler failure
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error with the given message
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }
}
