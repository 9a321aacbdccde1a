//! Readiness rules for child objects and status persistence
//!
//! Readiness is observed on the object returned by the last create or update
//! of a pass, or on the live object when nothing had to change.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info};

use super::pass::PassContext;
use super::store::ApplicationStore;
use crate::crd::{Application, ApplicationStatus, Readiness};
use crate::Error;

/// A Deployment is ready once every desired replica reports ready
pub fn deployment_readiness(deployment: &Deployment, desired_replicas: i32) -> Readiness {
    let ready_replicas = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    Readiness::from_ready(ready_replicas == desired_replicas)
}

/// A Service is ready once it has been allocated a cluster IP
pub fn service_readiness(service: &Service) -> Readiness {
    let allocated = service
        .spec
        .as_ref()
        .and_then(|s| s.cluster_ip.as_deref())
        .is_some_and(|ip| !ip.is_empty());
    Readiness::from_ready(allocated)
}

/// An Ingress is ready once its load balancer reports an address
pub fn ingress_readiness(ingress: &Ingress) -> Readiness {
    let has_address = ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .is_some_and(|entries| !entries.is_empty());
    Readiness::from_ready(has_address)
}

/// Write `status` unless it equals what is already stored
///
/// Returns true if a write happened.
pub async fn persist_status(
    store: &dyn ApplicationStore,
    app: &Application,
    status: &ApplicationStatus,
    pass: &PassContext,
) -> Result<bool, Error> {
    if app.status.as_ref() == Some(status) {
        debug!(application = %pass.key(), "status unchanged");
        return Ok(false);
    }

    pass.guard(store.patch_status(app, status)).await?;
    info!(
        application = %pass.key(),
        deployment = %status.deployment,
        service = %status.service,
        ingress = %status.ingress,
        reason = %status.reason,
        "status updated"
    );
    Ok(true)
}
