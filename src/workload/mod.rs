//! Desired-state synthesis for Application children
//!
//! Pure functions mapping an [`Application`] onto the Deployment, Service and
//! Ingress it should own. Nothing here talks to the cluster; the controller
//! compares these objects against live state and applies the difference.
//!
//! Every child shares one metadata block: the Application's name and
//! namespace plus the label set `{app: <name>}`. The same labels are used as
//! the Deployment selector and the pod template labels. A Deployment selector
//! is immutable once created, so the three must never diverge.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar as K8sEnvVar, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{Application, Exposure};
use crate::Error;

/// Label key binding every child to its Application
pub const APP_LABEL: &str = "app";

/// Name of the container port, referenced by the Service target port
pub const HTTP_PORT_NAME: &str = "http";

/// Ingress class handled by the supported ingress controller
pub const INGRESS_CLASS: &str = "nginx";

/// Annotation naming the ingress class, for controllers predating `ingressClassName`
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

const PULL_IF_NOT_PRESENT: &str = "IfNotPresent";
const PROTOCOL_TCP: &str = "TCP";
const SERVICE_TYPE_NODE_PORT: &str = "NodePort";
const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";
const PATH_ROOT: &str = "/";
const PATH_TYPE_PREFIX: &str = "Prefix";

/// Label set shared by object metadata, pod template and selector
pub fn app_labels(app: &Application) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), app.name_any())])
}

/// Metadata for every child of `app`
pub fn app_metadata(app: &Application) -> ObjectMeta {
    ObjectMeta {
        name: Some(app.name_any()),
        namespace: app.namespace(),
        labels: Some(app_labels(app)),
        ..Default::default()
    }
}

/// Service port for `app`, falling back to the container port
pub fn service_port(app: &Application, exposure: &Exposure) -> i32 {
    exposure.service_port().unwrap_or(app.spec.port)
}

/// Build the Deployment running the application container
pub fn build_deployment(app: &Application) -> Deployment {
    let spec = &app.spec;
    let labels = app_labels(app);

    let env = spec.env.as_ref().map(|vars| {
        vars.iter()
            .map(|v| K8sEnvVar {
                name: v.name.clone(),
                value: Some(v.value.clone()),
                ..Default::default()
            })
            .collect()
    });

    let container = Container {
        name: app.name_any(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some(PULL_IF_NOT_PRESENT.to_string()),
        command: spec
            .start_cmd
            .as_ref()
            .filter(|cmd| !cmd.is_empty())
            .map(|cmd| vec![cmd.clone()]),
        args: spec.args.clone().filter(|args| !args.is_empty()),
        env,
        ports: Some(vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: spec.port,
            protocol: Some(PROTOCOL_TCP.to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Deployment {
        metadata: app_metadata(app),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.desired_replicas()),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the Service in front of the Deployment
///
/// The target port refers to the container port by name so the Service port
/// can differ from the container port.
pub fn build_service(app: &Application, exposure: &Exposure) -> Service {
    let (type_, node_port) = match exposure {
        Exposure::NodePort { node_port, .. } => (SERVICE_TYPE_NODE_PORT, *node_port),
        Exposure::Ingress { .. } => (SERVICE_TYPE_CLUSTER_IP, None),
    };

    Service {
        metadata: app_metadata(app),
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(app_labels(app)),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port: service_port(app, exposure),
                target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
                protocol: Some(PROTOCOL_TCP.to_string()),
                node_port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the Ingress routing `domain` to the Service
pub fn build_ingress(app: &Application, domain: &str, service_port: i32) -> Ingress {
    let mut metadata = app_metadata(app);
    metadata.annotations = Some(BTreeMap::from([(
        INGRESS_CLASS_ANNOTATION.to_string(),
        INGRESS_CLASS.to_string(),
    )]));

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: Some(INGRESS_CLASS.to_string()),
            rules: Some(vec![IngressRule {
                host: Some(domain.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(PATH_ROOT.to_string()),
                        path_type: PATH_TYPE_PREFIX.to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: app.name_any(),
                                port: Some(ServiceBackendPort {
                                    number: Some(service_port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// All children an Application should own
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredState {
    /// Workload
    pub deployment: Deployment,
    /// Network service
    pub service: Service,
    /// Ingress route, present only in Ingress mode
    pub ingress: Option<Ingress>,
}

impl DesiredState {
    /// Synthesize the desired children for a validated Application
    pub fn synthesize(app: &Application, exposure: &Exposure) -> Self {
        let ingress = match exposure {
            Exposure::Ingress { domain, .. } => {
                Some(build_ingress(app, domain, service_port(app, exposure)))
            }
            Exposure::NodePort { .. } => None,
        };

        Self {
            deployment: build_deployment(app),
            service: build_service(app, exposure),
            ingress,
        }
    }
}

/// Mark `meta` as controlled by `app` so the garbage collector removes it with the owner
pub fn set_owner(meta: &mut ObjectMeta, app: &Application) -> Result<(), Error> {
    let owner = app.controller_owner_ref(&()).ok_or_else(|| {
        Error::internal_with_context(
            "owner",
            format!("application {} has no uid", app.key()),
        )
    })?;
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.uid != owner.uid);
    refs.push(owner);
    Ok(())
}
