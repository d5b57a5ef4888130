//! Mutating admission webhook for namespace project assignment
//!
//! Routes:
//! - `POST /mutate/{cluster}` - admission review for a namespace of `cluster`
//!   (a trailing `/` is accepted)
//! - `GET /healthz` - liveness
//! - `GET /readyz` - readiness, checks the Rancher API is readable

pub mod handler;
pub mod namespace;
pub mod patch;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use lattice_common::WebhookMetrics;
use lattice_rancher::IdentifierResolver;

use namespace::NamespaceMutator;

/// Largest admission review accepted
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Decision engine
    pub mutator: NamespaceMutator,
    /// Resolver used by the readiness probe
    pub resolver: Arc<dyn IdentifierResolver>,
    /// Request metrics sink
    pub metrics: Arc<dyn WebhookMetrics>,
    /// Deadline for requests that carry no `timeout` parameter
    pub request_timeout: Duration,
}

/// Create the webhook router
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate/{cluster}", post(handler::mutate_handler))
        .route("/mutate/{cluster}/", post(handler::mutate_handler))
        .route("/mutate", post(handler::missing_cluster_handler))
        .route("/mutate/", post(handler::missing_cluster_handler))
        .route("/healthz", get(handler::healthz))
        .route("/readyz", get(handler::readyz))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
