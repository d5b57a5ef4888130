//! HTTP handlers for admission reviews and probes

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use lattice_common::DecisionStatus;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::namespace::operation_name;
use super::WebhookState;

/// Operation label for requests whose review could not be read
pub const UNKNOWN_OPERATION: &str = "unknown";

/// Time budget of the readiness probe
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for webhook requests rejected before a decision is made
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request path carried no cluster name
    #[error("cluster name required")]
    MissingCluster,

    /// The admission review was invalid or malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Query parameters the API server appends to webhook calls
#[derive(Debug, Default, Deserialize)]
pub struct MutateParams {
    /// Remaining time the API server will wait, e.g. `10s`
    pub timeout: Option<String>,
}

/// Cancels its token once the deadline passes; the timer dies with the guard
struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn start(after: Duration) -> Self {
        let token = CancellationToken::new();
        let expire = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            expire.cancel();
        });
        Self { token, timer }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Parse an API server timeout such as `10s`, `500ms` or `1m`
pub fn parse_timeout(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit())?;
    let (value, unit) = raw.split_at(split);
    let value: u64 = value.parse().ok()?;
    let timeout = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60)?),
        _ => return None,
    };
    (!timeout.is_zero()).then_some(timeout)
}

fn parse_review(body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, WebhookError> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidReview(e.to_string()))?;
    review
        .try_into()
        .map_err(|e: kube::core::admission::ConvertAdmissionReviewError| {
            WebhookError::InvalidReview(e.to_string())
        })
}

/// Handle an admission review for a namespace of `cluster`
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Path(cluster): Path<String>,
    Query(params): Query<MutateParams>,
    body: Bytes,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let started = Instant::now();

    if cluster.trim().is_empty() {
        return Err(reject_missing_cluster(&state, started));
    }

    let request = match parse_review(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(cluster = %cluster, error = %e, "Failed to parse admission review");
            state
                .metrics
                .record_request(UNKNOWN_OPERATION, DecisionStatus::Error, started.elapsed());
            return Err(e);
        }
    };

    let operation = operation_name(&request.operation);
    let span = info_span!(
        "admission",
        request_id = %request.uid,
        cluster = %cluster,
        operation
    );

    let timeout = params
        .timeout
        .as_deref()
        .and_then(parse_timeout)
        .unwrap_or(state.request_timeout);
    let deadline = Deadline::start(timeout);

    let decision = state
        .mutator
        .mutate(&cluster, &request, deadline.token())
        .instrument(span.clone())
        .await;
    let (response, status) = decision.into_response(&request);

    let duration = started.elapsed();
    span.in_scope(|| {
        info!(
            status = %status,
            allowed = response.allowed,
            duration_ms = duration.as_millis() as u64,
            "Admission request processed"
        )
    });
    state.metrics.record_request(operation, status, duration);

    Ok(Json(response.into_review()))
}

/// Reject admission calls whose path names no cluster
pub async fn missing_cluster_handler(State(state): State<Arc<WebhookState>>) -> WebhookError {
    reject_missing_cluster(&state, Instant::now())
}

fn reject_missing_cluster(state: &WebhookState, started: Instant) -> WebhookError {
    warn!("Admission request without cluster name");
    state
        .metrics
        .record_request(UNKNOWN_OPERATION, DecisionStatus::Error, started.elapsed());
    WebhookError::MissingCluster
}

/// Liveness probe
pub async fn healthz() -> &'static str {
    "ok"
}

/// Readiness probe: the Rancher API must be readable within five seconds
pub async fn readyz(State(state): State<Arc<WebhookState>>) -> Response {
    let deadline = Deadline::start(READINESS_TIMEOUT);
    match state.resolver.health_check(deadline.token()).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {e}")).into_response()
        }
    }
}
