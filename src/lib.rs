//! Project webhook - assigns namespaces to Rancher projects at admission time
//!
//! Namespaces created in a Rancher-managed downstream cluster carry a label
//! naming their project by display name. This mutating admission webhook
//! resolves that name to Rancher's identifiers and stamps the
//! `field.cattle.io/projectId` annotation Rancher uses for project membership.
//!
//! # Modules
//!
//! - [`webhook`] - Admission decision engine, patch builder and HTTP handlers
//! - [`server`] - Listener, TLS and process signals
//! - [`config`] - Command-line and environment configuration
//! - [`error`] - Error types for the process

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod server;
pub mod webhook;

pub use error::Error;
