//! Object store seam between the controller and the API server
//!
//! The controller only needs a handful of operations per kind. They are
//! expressed as traits so reconciliation can be exercised against mocks and
//! an in-memory cluster in tests while production code wraps `kube::Api`.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::pass::ApplicationKey;
use super::status::{deployment_readiness, ingress_readiness, service_readiness};
use crate::crd::{Application, ApplicationStatus, Readiness};
use crate::{Error, FIELD_MANAGER};

/// Trait abstracting Application reads and status writes
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Get an Application, `None` if it no longer exists
    async fn get(&self, key: &ApplicationKey) -> Result<Option<Application>, Error>;

    /// Replace the status of an Application through the status subresource
    async fn patch_status(
        &self,
        app: &Application,
        status: &ApplicationStatus,
    ) -> Result<(), Error>;
}

/// A namespaced child kind the controller manages for an Application
pub trait ChildObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The `spec` of this object as JSON, used for drift comparison
    fn spec_value(&self) -> Result<serde_json::Value, Error>;

    /// Readiness of this object as observed for `app`
    fn readiness(&self, app: &Application) -> Readiness;
}

fn spec_to_value<T: Serialize>(kind: &str, spec: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(spec).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

impl ChildObject for Deployment {
    fn spec_value(&self) -> Result<serde_json::Value, Error> {
        spec_to_value("Deployment", &self.spec)
    }

    fn readiness(&self, app: &Application) -> Readiness {
        deployment_readiness(self, app.spec.desired_replicas())
    }
}

impl ChildObject for Service {
    fn spec_value(&self) -> Result<serde_json::Value, Error> {
        spec_to_value("Service", &self.spec)
    }

    fn readiness(&self, _app: &Application) -> Readiness {
        service_readiness(self)
    }
}

impl ChildObject for Ingress {
    fn spec_value(&self) -> Result<serde_json::Value, Error> {
        spec_to_value("Ingress", &self.spec)
    }

    fn readiness(&self, _app: &Application) -> Readiness {
        ingress_readiness(self)
    }
}

/// Create/read/update/delete operations for one child kind
#[async_trait]
pub trait ChildStore<K: ChildObject>: Send + Sync {
    /// Get an object, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>;

    /// Create an object
    async fn create(&self, obj: &K) -> Result<K, Error>;

    /// Run a server-side dry-run update and return the object as the server
    /// would store it, with defaults filled in
    async fn update_dry_run(&self, obj: &K) -> Result<K, Error>;

    /// Replace an object
    async fn update(&self, obj: &K) -> Result<K, Error>;

    /// Delete an object; returns false if it was already gone
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, Error>;
}

/// Real Kubernetes client implementation for Applications
pub struct KubeApplicationStore {
    client: Client,
}

impl KubeApplicationStore {
    /// Create a new KubeApplicationStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApplicationStore for KubeApplicationStore {
    async fn get(&self, key: &ApplicationKey) -> Result<Option<Application>, Error> {
        let api: Api<Application> = Api::namespaced(self.client.clone(), &key.namespace);
        match api.get(&key.name).await {
            Ok(app) => Ok(Some(app)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(
        &self,
        app: &Application,
        status: &ApplicationStatus,
    ) -> Result<(), Error> {
        let key = app.key();
        let api: Api<Application> = Api::namespaced(self.client.clone(), &key.namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

/// Real Kubernetes client implementation for a child kind
pub struct KubeChildStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeChildStore<K> {
    /// Create a new KubeChildStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K: ChildObject> KubeChildStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn api_for(&self, obj: &K) -> Api<K> {
        self.api(&obj.namespace().unwrap_or_default())
    }
}

fn post_params(dry_run: bool) -> PostParams {
    PostParams {
        dry_run,
        field_manager: Some(FIELD_MANAGER.to_string()),
    }
}

#[async_trait]
impl<K: ChildObject> ChildStore<K> for KubeChildStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        match self.api(namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, obj: &K) -> Result<K, Error> {
        Ok(self.api_for(obj).create(&post_params(false), obj).await?)
    }

    async fn update_dry_run(&self, obj: &K) -> Result<K, Error> {
        Ok(self
            .api_for(obj)
            .replace(&obj.name_any(), &post_params(true), obj)
            .await?)
    }

    async fn update(&self, obj: &K) -> Result<K, Error> {
        Ok(self
            .api_for(obj)
            .replace(&obj.name_any(), &post_params(false), obj)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(kind = %K::kind(&()), %namespace, %name, "already deleted");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
