//! Webhook listener and process signals

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use lattice_rancher::RancherResolver;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Error;

/// Time in-flight requests get to finish after a shutdown signal
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Certificate and key files for serving TLS
#[derive(Debug, Clone)]
pub struct TlsFiles {
    /// PEM certificate chain
    pub cert_file: PathBuf,
    /// PEM private key
    pub key_file: PathBuf,
}

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Serve TLS when set, plain HTTP otherwise
    pub tls: Option<TlsFiles>,
}

/// Serve `app` until `shutdown` fires, then drain for up to [`SHUTDOWN_GRACE`]
pub async fn serve(config: ServerConfig, app: Router, shutdown: CancellationToken) -> Result<(), Error> {
    match config.tls {
        Some(tls) => serve_tls(config.addr, tls, app, shutdown).await,
        None => serve_plain(config.addr, app, shutdown).await,
    }
}

async fn serve_tls(
    addr: SocketAddr,
    tls: TlsFiles,
    app: Router,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let tls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
        .await
        .map_err(|e| {
            Error::tls(format!(
                "failed to load {} / {}: {e}",
                tls.cert_file.display(),
                tls.key_file.display()
            ))
        })?;

    let handle = axum_server::Handle::new();
    let drain = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        info!(grace = ?SHUTDOWN_GRACE, "Draining webhook connections");
        drain.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    info!(addr = %addr, "Starting webhook server (TLS)");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn serve_plain(addr: SocketAddr, app: Router, shutdown: CancellationToken) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting webhook server (plain HTTP)");

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!(grace = ?SHUTDOWN_GRACE, "Connections still open after grace period, exiting");
        }
    }

    Ok(())
}

/// Listen for process signals.
///
/// SIGINT and SIGTERM cancel `shutdown`. SIGHUP clears the resolver caches.
pub fn spawn_signal_handler(
    shutdown: CancellationToken,
    resolver: Arc<RancherResolver>,
) -> Result<JoinHandle<()>, Error> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    break;
                }
                _ = sighup.recv() => {
                    let (clusters, projects) = resolver.cache_stats();
                    resolver.clear_cache();
                    info!(clusters, projects, "Received SIGHUP, dropped cached identifiers");
                }
                _ = shutdown.cancelled() => break,
            }
        }
        shutdown.cancel();
    }))
}
