//! Shared helpers for the kind integration tests

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{conditions, wait, Controller};
use kube::{Client, CustomResourceExt, ResourceExt};
use tokio_util::sync::CancellationToken;

use application_operator::controller::{error_policy, reconcile, Context};
use application_operator::crd::Application;
use application_operator::FIELD_MANAGER;

/// Connect to the test cluster and make sure the CRD is established
pub async fn ensure_test_cluster() -> anyhow::Result<Client> {
    let client = Client::try_default().await?;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = Application::crd();
    let name = crd.name_any();
    crds.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&crd),
    )
    .await?;

    tokio::time::timeout(
        Duration::from_secs(30),
        wait::await_condition(crds, &name, conditions::is_crd_established()),
    )
    .await??;

    Ok(client)
}

/// Create a throwaway namespace for one story
pub async fn create_namespace(client: &Client, name: &str) -> anyhow::Result<()> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match api.create(&PostParams::default(), &ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Delete a namespace and everything in it
pub async fn delete_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::background()).await;
}

/// Run the controller for `namespace` in the background until the token fires
pub fn start_controller(client: Client, namespace: &str) -> CancellationToken {
    let shutdown = CancellationToken::new();
    let ctx = Arc::new(
        Context::builder(client.clone())
            .shutdown(shutdown.clone())
            .build(),
    );

    let controller = Controller::new(
        Api::<Application>::namespaced(client.clone(), namespace),
        WatcherConfig::default(),
    )
    .owns(
        Api::<Deployment>::namespaced(client.clone(), namespace),
        WatcherConfig::default(),
    )
    .owns(
        Api::<Service>::namespaced(client.clone(), namespace),
        WatcherConfig::default(),
    )
    .owns(
        Api::<Ingress>::namespaced(client, namespace),
        WatcherConfig::default(),
    )
    .graceful_shutdown_on(shutdown.clone().cancelled_owned())
    .run(reconcile, error_policy, ctx)
    .for_each(|_| async {});

    tokio::spawn(controller);
    shutdown
}

/// Poll `check` every 500ms until it yields a value or `timeout` elapses
pub async fn eventually<T, F, Fut>(timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Some(value) = check().await {
            return Some(value);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    None
}
