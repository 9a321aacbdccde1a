//! Integration tests for the Application lifecycle
//!
//! Each story creates its own namespace, runs the controller in-process
//! against the kind cluster and observes the objects it produces.

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};

use application_operator::crd::{
    Application, ApplicationSpec, ExposeSpec, Readiness, MODE_INGRESS, MODE_NODE_PORT,
};

use super::helpers::{
    create_namespace, delete_namespace, ensure_test_cluster, eventually, start_controller,
};

const WAIT: Duration = Duration::from_secs(120);

// =============================================================================
// Test Fixtures
// =============================================================================

fn sample_application(namespace: &str, name: &str, expose: ExposeSpec) -> Application {
    Application {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: ApplicationSpec {
            image: "nginx:1.27".to_string(),
            port: 80,
            replicas: Some(1),
            start_cmd: None,
            args: None,
            env: None,
            expose,
        },
        status: None,
    }
}

fn node_port_expose(node_port: Option<i32>) -> ExposeSpec {
    ExposeSpec {
        mode: MODE_NODE_PORT.to_string(),
        node_port,
        service_port: Some(8080),
        ..Default::default()
    }
}

fn ingress_expose(domain: &str) -> ExposeSpec {
    ExposeSpec {
        mode: MODE_INGRESS.to_string(),
        ingress_domain: Some(domain.to_string()),
        ..Default::default()
    }
}

// =============================================================================
// Lifecycle Stories
// =============================================================================

/// Story: a user creates a NodePort application and gets a running workload
///
/// Expected behavior:
/// - A Deployment and a NodePort Service named after the application appear
/// - Both are owned by the application
/// - The status reports the Service and, once the pod is up, the Deployment as ready
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_node_port_application_becomes_ready() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ns = "app-op-node-port";
    create_namespace(&client, ns).await.unwrap();
    let shutdown = start_controller(client.clone(), ns);

    let apps: Api<Application> = Api::namespaced(client.clone(), ns);
    apps.create(
        &PostParams::default(),
        &sample_application(ns, "web", node_port_expose(Some(30081))),
    )
    .await
    .expect("create application");

    let services: Api<Service> = Api::namespaced(client.clone(), ns);
    let service = eventually(WAIT, || async { services.get_opt("web").await.ok().flatten() })
        .await
        .expect("service is created");
    let spec = service.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("NodePort"));
    assert_eq!(spec.ports.unwrap()[0].node_port, Some(30081));

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), ns);
    let deployment = deployments.get("web").await.expect("deployment is created");
    let owners = deployment.metadata.owner_references.unwrap();
    assert_eq!(owners[0].kind, "Application");

    let status = eventually(WAIT, || async {
        apps.get_status("web")
            .await
            .ok()
            .and_then(|a| a.status)
            .filter(|s| s.deployment == Readiness::Ready)
    })
    .await
    .expect("deployment becomes ready");
    assert_eq!(status.service, Readiness::Ready);
    assert_eq!(status.ingress, Readiness::NotReady);
    assert_eq!(status.reason, "");

    shutdown.cancel();
    delete_namespace(&client, ns).await;
}

/// Story: a typo in the exposure mode is explained in the status
///
/// Expected behavior:
/// - No children are created
/// - The status reason names the unsupported mode
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_invalid_mode_is_reported() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ns = "app-op-invalid";
    create_namespace(&client, ns).await.unwrap();
    let shutdown = start_controller(client.clone(), ns);

    let apps: Api<Application> = Api::namespaced(client.clone(), ns);
    let mut expose = node_port_expose(None);
    expose.mode = "InvalidMode".to_string();
    apps.create(
        &PostParams::default(),
        &sample_application(ns, "broken", expose),
    )
    .await
    .expect("create application");

    let status = eventually(WAIT, || async {
        apps.get_status("broken")
            .await
            .ok()
            .and_then(|a| a.status)
            .filter(|s| !s.reason.is_empty())
    })
    .await
    .expect("status is written");
    assert_eq!(status.reason, "unsupported exposure mode: InvalidMode");

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), ns);
    assert!(deployments.get_opt("broken").await.unwrap().is_none());

    shutdown.cancel();
    delete_namespace(&client, ns).await;
}

/// Story: a user moves an application from NodePort to Ingress and back
///
/// Expected behavior:
/// - Switching to Ingress mode creates an Ingress and retypes the Service
/// - Switching back deletes the Ingress
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_mode_switch_adds_and_removes_ingress() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ns = "app-op-switch";
    create_namespace(&client, ns).await.unwrap();
    let shutdown = start_controller(client.clone(), ns);

    let apps: Api<Application> = Api::namespaced(client.clone(), ns);
    apps.create(
        &PostParams::default(),
        &sample_application(ns, "site", node_port_expose(None)),
    )
    .await
    .expect("create application");

    let services: Api<Service> = Api::namespaced(client.clone(), ns);
    eventually(WAIT, || async { services.get_opt("site").await.ok().flatten() })
        .await
        .expect("service is created");

    let patch = serde_json::json!({ "spec": { "expose": ingress_expose("site.example.com") } });
    apps.patch("site", &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("switch to ingress");

    let ingresses: Api<Ingress> = Api::namespaced(client.clone(), ns);
    let ingress = eventually(WAIT, || async { ingresses.get_opt("site").await.ok().flatten() })
        .await
        .expect("ingress is created");
    let rules = ingress.spec.unwrap().rules.unwrap();
    assert_eq!(rules[0].host.as_deref(), Some("site.example.com"));

    let service = services.get("site").await.unwrap();
    assert_eq!(service.spec.unwrap().type_.as_deref(), Some("ClusterIP"));

    let patch = serde_json::json!({ "spec": { "expose": node_port_expose(None) } });
    apps.patch("site", &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("switch back to node port");

    let gone = eventually(WAIT, || async {
        match ingresses.get_opt("site").await {
            Ok(None) => Some(()),
            _ => None,
        }
    })
    .await;
    assert!(gone.is_some(), "ingress is removed");

    shutdown.cancel();
    delete_namespace(&client, ns).await;
}
