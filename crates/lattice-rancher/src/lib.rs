//! Rancher identifier resolution for the project webhook
//!
//! Turns a downstream cluster's display name into its management cluster ID
//! and a project display name into its project ID, with TTL caching, bounded
//! retries and a background eviction sweep.

#![deny(missing_docs)]

pub mod backend;
pub mod cache;
pub mod error;
pub mod resolver;

pub use backend::{KubeBackend, RancherBackend, RancherResource};
pub use cache::{EvictionTask, ProjectKey, ResolverCaches, TtlCache};
pub use error::{ApiErrorKind, BackendError, LookupError};
pub use resolver::{IdentifierResolver, RancherResolver, ResolverConfig};
