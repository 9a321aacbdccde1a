//! Supporting types for the Application CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Error;

/// Lowest node port the API server will accept
pub const NODE_PORT_MIN: i32 = 30000;

/// Highest node port the API server will accept
pub const NODE_PORT_MAX: i32 = 32767;

/// Wire value of the Ingress exposure mode
pub const MODE_INGRESS: &str = "Ingress";

/// Wire value of the NodePort exposure mode
pub const MODE_NODE_PORT: &str = "NodePort";

/// Environment variable passed to the application container
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

/// How the application is reached from outside the cluster, as written by the user
///
/// `mode` stays a plain string on the wire so an unsupported value surfaces as a
/// validation failure in the status instead of an undecodable object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExposeSpec {
    /// Exposure mode: `Ingress` or `NodePort`
    pub mode: String,

    /// Host name routed to the application (Ingress mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_domain: Option<String>,

    /// Fixed node port (NodePort mode); unset or 0 lets the platform choose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,

    /// Port exposed by the Service; defaults to the container port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<i32>,
}

impl ExposeSpec {
    /// Validate the exposure configuration and select its branch
    ///
    /// `application` is the `namespace/name` key used for error context.
    pub fn validate(&self, application: &str) -> Result<Exposure, Error> {
        let service_port = self.service_port.filter(|p| *p != 0);

        match self.mode.as_str() {
            MODE_INGRESS => {
                let domain = self
                    .ingress_domain
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        Error::validation_for_field(
                            application,
                            "spec.expose.ingressDomain",
                            "ingress mode requires a non-empty domain",
                        )
                    })?;
                Ok(Exposure::Ingress {
                    domain: domain.to_string(),
                    service_port,
                })
            }
            MODE_NODE_PORT => {
                let node_port = match self.node_port.unwrap_or(0) {
                    0 => {
                        info!(
                            application,
                            "node port unset, platform will assign one between {NODE_PORT_MIN} and {NODE_PORT_MAX}"
                        );
                        None
                    }
                    port if (NODE_PORT_MIN..=NODE_PORT_MAX).contains(&port) => Some(port),
                    port => {
                        return Err(Error::validation_for_field(
                            application,
                            "spec.expose.nodePort",
                            format!(
                                "invalid node port {port}: must be between {NODE_PORT_MIN} and {NODE_PORT_MAX}"
                            ),
                        ))
                    }
                };
                Ok(Exposure::NodePort {
                    node_port,
                    service_port,
                })
            }
            other => Err(Error::validation_for_field(
                application,
                "spec.expose.mode",
                format!("unsupported exposure mode: {other}"),
            )),
        }
    }
}

/// Validated exposure, one variant per mode
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exposure {
    /// Route `domain` through an Ingress to the Service
    Ingress {
        /// Host name of the single ingress rule
        domain: String,
        /// Service port, `None` to fall back to the container port
        service_port: Option<i32>,
    },
    /// Open a port on every node
    NodePort {
        /// Requested node port, `None` when the platform should choose
        node_port: Option<i32>,
        /// Service port, `None` to fall back to the container port
        service_port: Option<i32>,
    },
}

impl Exposure {
    /// Explicitly configured service port, if any
    pub fn service_port(&self) -> Option<i32> {
        match self {
            Self::Ingress { service_port, .. } | Self::NodePort { service_port, .. } => {
                *service_port
            }
        }
    }
}

impl std::fmt::Display for Exposure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ingress { .. } => write!(f, "{MODE_INGRESS}"),
            Self::NodePort { .. } => write!(f, "{MODE_NODE_PORT}"),
        }
    }
}

/// Two-valued readiness marker reported for each child object
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Readiness {
    /// The child object is serving as desired
    #[serde(rename = "ready")]
    Ready,
    /// The child object is missing or still converging
    #[default]
    #[serde(rename = "not ready")]
    NotReady,
}

impl Readiness {
    /// Map a boolean observation onto a marker
    pub fn from_ready(ready: bool) -> Self {
        if ready {
            Self::Ready
        } else {
            Self::NotReady
        }
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::NotReady => write!(f, "not ready"),
        }
    }
}
