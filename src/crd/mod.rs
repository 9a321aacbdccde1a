//! Custom Resource Definitions for the application operator
//!
//! This module contains the Application CRD and its supporting types.

mod application;
mod types;

pub use application::{Application, ApplicationSpec, ApplicationStatus};
pub use types::{
    EnvVar, ExposeSpec, Exposure, Readiness, MODE_INGRESS, MODE_NODE_PORT, NODE_PORT_MAX,
    NODE_PORT_MIN,
};
