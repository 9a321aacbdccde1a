//! Application Custom Resource Definition
//!
//! An Application describes one containerized workload: the image to run, the
//! port it listens on, how many replicas to keep, and how it is exposed. The
//! operator turns it into a Deployment, a Service and, in Ingress mode, an
//! Ingress, and reports their readiness back in the status.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{EnvVar, ExposeSpec, Exposure, Readiness};
use crate::controller::ApplicationKey;
use crate::Error;

/// Specification for an Application
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "apps.xinyan.cn",
    version = "v1alpha1",
    kind = "Application",
    plural = "applications",
    shortname = "app",
    status = "ApplicationStatus",
    namespaced,
    printcolumn = r#"{"name":"Deployment","type":"string","jsonPath":".status.deployment"}"#,
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".status.service"}"#,
    printcolumn = r#"{"name":"Ingress","type":"string","jsonPath":".status.ingress"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason","priority":1}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Container image reference
    pub image: String,

    /// Port the application listens on inside the container
    pub port: i32,

    /// Desired number of pods; defaults to 1 when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Start command overriding the image entrypoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cmd: Option<String>,

    /// Arguments passed to the application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Environment variables for the application container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    /// How the application is exposed outside the cluster
    pub expose: ExposeSpec,
}

impl ApplicationSpec {
    /// Replica count with the default applied; zero passes through
    pub fn desired_replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }

    /// Validate the spec, returning the selected exposure branch
    pub fn validate(&self, application: &str) -> Result<Exposure, Error> {
        self.expose.validate(application)
    }
}

impl Application {
    /// Namespaced key identifying this Application
    pub fn key(&self) -> ApplicationKey {
        ApplicationKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }
}

/// Observed state of an Application, owned by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    /// Whether the Deployment is ready
    #[serde(default)]
    pub deployment: Readiness,

    /// Whether the Service is ready
    #[serde(default)]
    pub service: Readiness,

    /// Whether the Ingress is ready
    #[serde(default)]
    pub ingress: Readiness,

    /// Why the application is in this state (last error or validation failure)
    #[serde(default)]
    pub reason: String,
}

impl ApplicationStatus {
    /// Status at the start of a pass: nothing ready, no reason
    pub fn not_ready() -> Self {
        Self::default()
    }

    /// Set the reason and return self for chaining
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}
