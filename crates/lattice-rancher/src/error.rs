//! Error types for Rancher identifier resolution
//!
//! Backend failures are classified into an [`ApiErrorKind`] so the retry loop
//! can tell transient conditions from terminal ones. [`LookupError`] is what
//! resolver callers see; it knows which metric bucket it belongs to.

use std::fmt;

use lattice_common::LookupErrorKind;
use thiserror::Error;

/// Classification of a failed backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Server or client-side timeout (408, 504, or an expired attempt)
    Timeout,
    /// Rate limited (429)
    TooManyRequests,
    /// Backend unavailable or unreachable (503, transport failures)
    ServiceUnavailable,
    /// Backend internal error (500)
    Internal,
    /// Resource does not exist (404)
    NotFound,
    /// Malformed request (400)
    BadRequest,
    /// Caller lacks permission (403)
    Forbidden,
    /// Caller is not authenticated (401)
    Unauthorized,
    /// Anything else
    Other,
}

impl ApiErrorKind {
    /// Classify an HTTP status code returned by the API server
    pub fn from_status(code: u16) -> Self {
        match code {
            408 | 504 => ApiErrorKind::Timeout,
            429 => ApiErrorKind::TooManyRequests,
            503 => ApiErrorKind::ServiceUnavailable,
            500 => ApiErrorKind::Internal,
            404 => ApiErrorKind::NotFound,
            400 => ApiErrorKind::BadRequest,
            403 => ApiErrorKind::Forbidden,
            401 => ApiErrorKind::Unauthorized,
            _ => ApiErrorKind::Other,
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ApiErrorKind::Timeout
                | ApiErrorKind::TooManyRequests
                | ApiErrorKind::ServiceUnavailable
                | ApiErrorKind::Internal
        )
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiErrorKind::Timeout => "timeout",
            ApiErrorKind::TooManyRequests => "too many requests",
            ApiErrorKind::ServiceUnavailable => "service unavailable",
            ApiErrorKind::Internal => "internal error",
            ApiErrorKind::NotFound => "not found",
            ApiErrorKind::BadRequest => "bad request",
            ApiErrorKind::Forbidden => "forbidden",
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

/// A failed call against the Rancher API
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// What went wrong, for retry decisions
    pub kind: ApiErrorKind,
    /// Backend-provided detail
    pub message: String,
}

impl BackendError {
    /// Create a backend error of the given kind
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// An attempt that did not finish within its time budget
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<kube::Error> for BackendError {
    fn from(e: kube::Error) -> Self {
        let kind = match &e {
            kube::Error::Api(status) => ApiErrorKind::from_status(status.code),
            kube::Error::HyperError(_) | kube::Error::Service(_) => {
                ApiErrorKind::ServiceUnavailable
            }
            _ => ApiErrorKind::Other,
        };
        Self::new(kind, e.to_string())
    }
}

/// Errors returned by the resolver
#[derive(Debug, Error)]
pub enum LookupError {
    /// The cluster could not be fetched
    #[error("failed to get cluster {cluster}: {source}")]
    ClusterApi {
        /// Cluster display name
        cluster: String,
        /// Underlying backend error
        source: BackendError,
    },

    /// The cluster exists but has no management cluster ID yet
    #[error("clusterName not found in cluster {cluster} status")]
    ClusterIdMissing {
        /// Cluster display name
        cluster: String,
    },

    /// Projects could not be listed
    #[error("failed to list projects in cluster {cluster_id}: {source}")]
    ProjectApi {
        /// Management cluster ID
        cluster_id: String,
        /// Underlying backend error
        source: BackendError,
    },

    /// No project in the cluster carries the display name
    #[error("project {project} not found in cluster {cluster_id}")]
    ProjectNotFound {
        /// Management cluster ID
        cluster_id: String,
        /// Project display name
        project: String,
    },

    /// Readiness probe could not reach a resource
    #[error("failed to access {resource}: {source}")]
    HealthCheck {
        /// Fully qualified resource name
        resource: String,
        /// Underlying backend error
        source: BackendError,
    },

    /// The caller's deadline fired first
    #[error("{operation} cancelled")]
    Cancelled {
        /// Lookup that was interrupted
        operation: String,
    },
}

impl LookupError {
    /// Metric bucket for this failure
    pub fn kind(&self) -> LookupErrorKind {
        match self {
            LookupError::ClusterIdMissing { .. } | LookupError::ProjectNotFound { .. } => {
                LookupErrorKind::NotFound
            }
            LookupError::ClusterApi { .. }
            | LookupError::ProjectApi { .. }
            | LookupError::HealthCheck { .. }
            | LookupError::Cancelled { .. } => LookupErrorKind::Api,
        }
    }

    /// Whether the failure came from the caller's cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LookupError::Cancelled { .. })
    }
}
