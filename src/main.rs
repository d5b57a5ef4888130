//! Project webhook - Rancher project assignment for namespaces

use std::sync::Arc;

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio_util::sync::CancellationToken;
use tracing::info;

use lattice_common::telemetry::init_telemetry;
use lattice_common::{OtelMetrics, WebhookMetrics};
use lattice_project_webhook::config::Cli;
use lattice_project_webhook::server::{serve, spawn_signal_handler};
use lattice_project_webhook::webhook::namespace::NamespaceMutator;
use lattice_project_webhook::webhook::{webhook_router, WebhookState};
use lattice_project_webhook::Error;
use lattice_rancher::{IdentifierResolver, KubeBackend, RancherResolver, ResolverCaches};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let telemetry = init_telemetry(cli.telemetry_config()).map_err(Error::from)?;
    let server_config = cli.server_config()?;

    info!(
        port = cli.port,
        strict_mode = cli.strict_mode,
        dry_run = cli.dry_run,
        cache_ttl = ?cli.cache_ttl(),
        project_label = %cli.project_label,
        project_annotation = %cli.project_annotation,
        "Starting project webhook"
    );

    let client = kube_client(&cli).await?;
    let metrics: Arc<dyn WebhookMetrics> = Arc::new(OtelMetrics::new(
        &opentelemetry::global::meter("project-webhook"),
    ));

    let resolver = Arc::new(RancherResolver::new(
        Arc::new(KubeBackend::new(client)),
        ResolverCaches::new(cli.cache_ttl()),
        metrics.clone(),
        cli.resolver_config(),
    ));
    let identifiers: Arc<dyn IdentifierResolver> = resolver.clone();

    let state = Arc::new(WebhookState {
        mutator: NamespaceMutator::new(identifiers.clone(), cli.mutation_config()),
        resolver: identifiers,
        metrics,
        request_timeout: cli.request_timeout(),
    });

    let shutdown = CancellationToken::new();
    let signals = spawn_signal_handler(shutdown.clone(), resolver.clone())?;

    let result = serve(server_config, webhook_router(state), shutdown.clone()).await;

    shutdown.cancel();
    let _ = signals.await;
    resolver.shutdown().await;
    info!("Project webhook stopped");
    telemetry.shutdown();

    result?;
    Ok(())
}

/// Client for the Rancher management cluster: explicit kubeconfig, else inferred
async fn kube_client(cli: &Cli) -> Result<Client, Error> {
    let config = match &cli.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("invalid kubeconfig {}: {e}", path.display())))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer kubernetes config: {e}")))?,
    };
    Ok(Client::try_from(config)?)
}
