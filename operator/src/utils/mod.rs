//! Utils is shared functions and constants for the controller
use std::sync::Mutex;


use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Service, ServicePort},
};
use kube::{
    api::{DeleteParams, Patch, PatchParams, PostParams},
    client::Client,
    Api,
};
use rand::{rngs::StdRng, thread_rng, SeedableRng};
use serde_json::json;

use anyhow::Result;

use crate::{Config, CONTROLLER_NAME};

/// Operator Context
pub struct Context<C, Rng> {
    /// Kube client, used by the watch loops
    pub k_client: Client,
    /// Cluster operations the reconciler depends on
    pub cluster: C,
    /// Random number generator, used for retry jitter
    pub rng: Mutex<Rng>,
    /// Immutable configuration built at startup
    pub config: Config,
}

impl Context<KubeCluster, StdRng> {
    /// Create new context
    pub fn new(k_client: Client, config: Config) -> Result<Self> {
        Ok(Context {
            cluster: KubeCluster::new(k_client.clone()),
            k_client,
            rng: Mutex::new(StdRng::from_rng(thread_rng())?),
            config,
        })
    }
}

/// Result of a mutation where losing a race is an expected, non-fatal answer.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The mutation was applied.
    Done(T),
    /// Create found the object already present.
    AlreadyExists,
    /// The object was not there to patch or delete.
    NotFound,
    /// The object changed since it was read.
    Conflict,
}

/// Define the behavior we consume from the Kubernetes API.
///
/// Lookups are always namespace scoped.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a workload, `None` when it does not exist.
    async fn get_workload(&self, ns: &str, name: &str) -> Result<Option<Deployment>, kube::Error>;
    /// Get a service, `None` when it does not exist.
    async fn get_service(&self, ns: &str, name: &str) -> Result<Option<Service>, kube::Error>;
    /// Create a service.
    async fn create_service(
        &self,
        ns: &str,
        service: Service,
    ) -> Result<Outcome<Service>, kube::Error>;
    /// Replace the port list of a service, leaving the rest of its spec untouched.
    ///
    /// When a resource version is given the patch only applies to that version.
    async fn patch_service_ports(
        &self,
        ns: &str,
        name: &str,
        ports: Vec<ServicePort>,
        resource_version: Option<String>,
    ) -> Result<Outcome<Service>, kube::Error>;
    /// Delete a service.
    async fn delete_service(&self, ns: &str, name: &str) -> Result<Outcome<()>, kube::Error>;
}

/// [`ClusterClient`] backed by a real API server.
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn services(&self, ns: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), ns)
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get_workload(&self, ns: &str, name: &str) -> Result<Option<Deployment>, kube::Error> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
        deployments.get_opt(name).await
    }

    async fn get_service(&self, ns: &str, name: &str) -> Result<Option<Service>, kube::Error> {
        self.services(ns).get_opt(name).await
    }

    async fn create_service(
        &self,
        ns: &str,
        service: Service,
    ) -> Result<Outcome<Service>, kube::Error> {
        let params = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_owned()),
            ..Default::default()
        };
        outcome(self.services(ns).create(&params, &service).await)
    }

    async fn patch_service_ports(
        &self,
        ns: &str,
        name: &str,
        ports: Vec<ServicePort>,
        resource_version: Option<String>,
    ) -> Result<Outcome<Service>, kube::Error> {
        // A merge patch replaces the whole list, so ports that went away are dropped.
        let mut patch = json!({ "spec": { "ports": ports } });
        if let Some(resource_version) = resource_version {
            patch["metadata"] = json!({ "resourceVersion": resource_version });
        }
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_owned()),
            ..Default::default()
        };
        outcome(
            self.services(ns)
                .patch(name, &params, &Patch::Merge(patch))
                .await,
        )
    }

    async fn delete_service(&self, ns: &str, name: &str) -> Result<Outcome<()>, kube::Error> {
        outcome(
            self.services(ns)
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ()),
        )
    }
}

/// Sort API failures into expected races and real errors.
fn outcome<T>(result: Result<T, kube::Error>) -> Result<Outcome<T>, kube::Error> {
    match result {
        Ok(value) => Ok(Outcome::Done(value)),
        Err(kube::Error::Api(err)) if err.reason == "AlreadyExists" => Ok(Outcome::AlreadyExists),
        Err(kube::Error::Api(err)) if err.reason == "NotFound" || err.code == 404 => {
            Ok(Outcome::NotFound)
        }
        Err(kube::Error::Api(err)) if err.reason == "Conflict" || err.code == 409 => {
            Ok(Outcome::Conflict)
        }
        Err(e) => Err(e),
    }
}
