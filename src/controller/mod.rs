//! Controller for Application resources
//!
//! This module contains the reconciliation logic that turns an Application
//! into its Deployment, Service and Ingress and reports their readiness.
//! Controllers follow the Kubernetes controller pattern with observe-diff-act loops.

mod application;
mod drift;
mod pass;
mod status;
mod store;

pub use application::{error_policy, reconcile, reconcile_application, Context, ContextBuilder};
pub use drift::{needs_update, normalize, semantic_eq};
pub use pass::{ApplicationKey, KeyedLocks, PassContext};
pub use status::{deployment_readiness, ingress_readiness, persist_status, service_readiness};
pub use store::{
    ApplicationStore, ChildObject, ChildStore, KubeApplicationStore, KubeChildStore,
};
