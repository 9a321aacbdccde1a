//! Application controller implementation
//!
//! One pass drives an Application's children towards the desired state:
//!
//! 1. fetch the Application; if it is gone the pass ends
//! 2. start from a fresh "nothing ready" status
//! 3. validate the exposure; an invalid spec is recorded in the status and
//!    waits for the user to change it
//! 4. create or update the Deployment and the Service
//! 5. create or update the Ingress in Ingress mode, delete it otherwise
//! 6. persist the status if it changed
//!
//! Updates are only issued when a server-side dry-run of the desired object
//! differs from the live object, so a converged Application costs reads only.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::controller::Action;
use kube::{Client, Resource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::drift::needs_update;
use super::pass::{ApplicationKey, KeyedLocks, PassContext};
use super::status::persist_status;
use super::store::{
    ApplicationStore, ChildObject, ChildStore, KubeApplicationStore, KubeChildStore,
};
use crate::crd::{Application, ApplicationStatus, Exposure, Readiness};
use crate::workload::{build_deployment, build_ingress, build_service, service_port, set_owner};
use crate::{Error, RETRY_DELAY};

/// Controller context containing shared state and clients
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .shutdown(token)
///     .build();
/// ```
pub struct Context {
    /// Application reads and status writes
    pub applications: Arc<dyn ApplicationStore>,
    /// Deployment operations
    pub deployments: Arc<dyn ChildStore<Deployment>>,
    /// Service operations
    pub services: Arc<dyn ChildStore<Service>>,
    /// Ingress operations
    pub ingresses: Arc<dyn ChildStore<Ingress>>,
    /// Serializes passes per Application
    pub locks: KeyedLocks,
    /// Cancelled when the operator shuts down
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Start a pass for `key` that is cancelled along with the operator
    pub fn pass(&self, key: ApplicationKey) -> PassContext {
        PassContext::new(key, self.shutdown.child_token())
    }

    /// Create a context for testing with custom stores
    ///
    /// This method is primarily for unit tests where a real Kubernetes
    /// client is not available. For production code, use [`Context::builder`].
    #[cfg(test)]
    pub fn for_testing(
        applications: Arc<dyn ApplicationStore>,
        deployments: Arc<dyn ChildStore<Deployment>>,
        services: Arc<dyn ChildStore<Service>>,
        ingresses: Arc<dyn ChildStore<Ingress>>,
    ) -> Self {
        Self {
            applications,
            deployments,
            services,
            ingresses,
            locks: KeyedLocks::new(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    shutdown: Option<CancellationToken>,
}

impl ContextBuilder {
    /// Create a new builder with the given Kubernetes client
    fn new(client: Client) -> Self {
        Self {
            client,
            shutdown: None,
        }
    }

    /// Cancel in-flight passes when `token` fires
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            applications: Arc::new(KubeApplicationStore::new(self.client.clone())),
            deployments: Arc::new(KubeChildStore::<Deployment>::new(self.client.clone())),
            services: Arc::new(KubeChildStore::<Service>::new(self.client.clone())),
            ingresses: Arc::new(KubeChildStore::<Ingress>::new(self.client)),
            locks: KeyedLocks::new(),
            shutdown: self.shutdown.unwrap_or_default(),
        }
    }
}

/// Reconcile an Application on behalf of the controller runtime
pub async fn reconcile(app: Arc<Application>, ctx: Arc<Context>) -> Result<Action, Error> {
    let pass = ctx.pass(app.key());
    reconcile_application(&ctx, &pass).await
}

/// Run one reconciliation pass for the Application named by `pass`
///
/// The Application is re-read at the start of the pass, so the object that
/// triggered it may be stale or already deleted. Validation failures are
/// terminal until the spec changes; any other failure is recorded in the
/// status and returned for the caller to retry.
///
/// The key's lock is held for the whole pass, and waiting for it is
/// interrupted by cancellation like any other wait. The lock entry is
/// released afterwards unless another pass is queued on it.
#[instrument(skip(ctx, pass), fields(application = %pass.key()))]
pub async fn reconcile_application(ctx: &Context, pass: &PassContext) -> Result<Action, Error> {
    let key = pass.key();
    let result = async {
        let _guard = pass
            .guard(async { Ok::<_, Error>(ctx.locks.lock(key).await) })
            .await?;
        run_pass(ctx, pass).await
    }
    .await;
    ctx.locks.forget(key);
    result
}

/// Body of a pass, run while holding the key's lock
async fn run_pass(ctx: &Context, pass: &PassContext) -> Result<Action, Error> {
    let key = pass.key();
    let Some(app) = pass.guard(ctx.applications.get(key)).await? else {
        debug!("application not found, nothing to do");
        return Ok(Action::await_change());
    };
    info!("reconciling application");

    let exposure = match app.spec.validate(&key.to_string()) {
        Ok(exposure) => exposure,
        Err(e) => {
            warn!(error = %e, "application validation failed");
            let status = ApplicationStatus::not_ready().reason(e.reason());
            persist_status(ctx.applications.as_ref(), &app, &status, pass).await?;
            // Don't requeue for validation errors - they require spec changes
            return Ok(Action::await_change());
        }
    };

    let mut status = ApplicationStatus::not_ready();
    match apply_children(ctx, pass, &app, &exposure, &mut status).await {
        Ok(()) => {
            persist_status(ctx.applications.as_ref(), &app, &status, pass).await?;
            debug!(%exposure, "application reconciled");
            Ok(Action::await_change())
        }
        Err(e @ Error::Cancelled { .. }) => {
            info!("pass cancelled");
            Err(e)
        }
        Err(e) => {
            status.reason = e.reason();
            if let Err(persist_err) =
                persist_status(ctx.applications.as_ref(), &app, &status, pass).await
            {
                warn!(error = %persist_err, "failed to record failure in status");
            }
            Err(e)
        }
    }
}

/// Bring every child in line with the desired state, recording readiness
async fn apply_children(
    ctx: &Context,
    pass: &PassContext,
    app: &Application,
    exposure: &Exposure,
    status: &mut ApplicationStatus,
) -> Result<(), Error> {
    status.deployment =
        create_or_update(ctx.deployments.as_ref(), pass, app, build_deployment(app)).await?;
    status.service =
        create_or_update(ctx.services.as_ref(), pass, app, build_service(app, exposure)).await?;

    status.ingress = match exposure {
        Exposure::Ingress { domain, .. } => {
            let ingress = build_ingress(app, domain, service_port(app, exposure));
            create_or_update(ctx.ingresses.as_ref(), pass, app, ingress).await?
        }
        Exposure::NodePort { .. } => {
            remove_child(ctx.ingresses.as_ref(), pass).await?;
            Readiness::NotReady
        }
    };

    Ok(())
}

/// Create `desired` if it is missing, update it if it drifted
///
/// Returns the readiness of the resulting object.
async fn create_or_update<K: ChildObject>(
    store: &dyn ChildStore<K>,
    pass: &PassContext,
    app: &Application,
    mut desired: K,
) -> Result<Readiness, Error> {
    let kind = K::kind(&()).to_string();
    let key = pass.key();
    set_owner(desired.meta_mut(), app)?;

    let live = pass.guard(store.get(&key.namespace, &key.name)).await?;
    let observed = match live {
        None => {
            info!(%kind, "creating");
            pass.guard(store.create(&desired)).await?
        }
        Some(live) => {
            desired.meta_mut().resource_version = live.meta().resource_version.clone();
            let materialized = pass.guard(store.update_dry_run(&desired)).await?;
            if needs_update(&materialized, &live)? {
                info!(%kind, "updating");
                pass.guard(store.update(&desired)).await?
            } else {
                debug!(%kind, "up to date");
                live
            }
        }
    };

    Ok(observed.readiness(app))
}

/// Delete the child named after the Application if it exists
async fn remove_child<K: ChildObject>(
    store: &dyn ChildStore<K>,
    pass: &PassContext,
) -> Result<(), Error> {
    let key = pass.key();
    if pass.guard(store.get(&key.namespace, &key.name)).await?.is_none() {
        return Ok(());
    }
    if pass.guard(store.delete(&key.namespace, &key.name)).await? {
        info!(kind = %K::kind(&()), "deleted");
    } else {
        debug!(kind = %K::kind(&()), "already deleted");
    }
    Ok(())
}

/// Error policy for the controller
///
/// Transient failures are retried after [`RETRY_DELAY`]; anything else waits
/// for the Application to change.
pub fn error_policy(app: Arc<Application>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(%error, application = %app.key(), "reconciliation failed, will retry");
        Action::requeue(RETRY_DELAY)
    } else {
        error!(%error, application = %app.key(), "reconciliation failed");
        Action::await_change()
    }
}
