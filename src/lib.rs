//! Application operator - turns Application resources into running workloads
//!
//! An Application names a container image, the port it listens on, a replica
//! count and an exposure mode. The operator keeps a Deployment, a Service and,
//! in Ingress mode, an Ingress in line with it and reports their readiness in
//! the Application status.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definition (Application) and exposure validation
//! - [`workload`] - Desired-state synthesis for the child objects
//! - [`controller`] - Reconciliation, drift detection and status aggregation
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;
pub mod workload;

use std::time::Duration;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Field manager recorded on every object the operator writes
pub const FIELD_MANAGER: &str = "application-operator";

/// Delay before a pass that failed with a transient error is retried
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str =
    "info,application_operator=debug,kube=info,tower=warn,hyper=warn";
