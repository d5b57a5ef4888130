//! Common plumbing for the project webhook: retries, metrics and telemetry

#![deny(missing_docs)]

pub mod metrics;
pub mod retry;
pub mod telemetry;

pub use metrics::{
    CacheType, DecisionStatus, InMemoryMetrics, LookupErrorKind, LookupKind, OtelMetrics,
    WebhookMetrics,
};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
