//! Test helpers: a workload builder and an in-memory cluster.
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, Time},
    chrono::Utc,
};
use kube::core::ObjectMeta;

use crate::{
    labels::DEFAULT_SERVICED_LABEL,
    utils::{ClusterClient, Outcome},
};

/// Builds deployments the way the API server would return them.
pub struct WorkloadBuilder {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    containers: Vec<Container>,
    deleting: bool,
}

impl WorkloadBuilder {
    /// Workload in the default namespace with one container named `app`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: "default".to_owned(),
            labels: BTreeMap::new(),
            containers: vec![Container {
                name: "app".to_owned(),
                ..Default::default()
            }],
            deleting: false,
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_owned();
        self
    }

    /// Add the default serviced label.
    pub fn serviced(self) -> Self {
        self.label(DEFAULT_SERVICED_LABEL, "true")
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Start another container, later ports land in it.
    pub fn container(mut self, name: &str) -> Self {
        self.containers.push(Container {
            name: name.to_owned(),
            ..Default::default()
        });
        self
    }

    /// Declare a port on the last container.
    pub fn port(mut self, port: i32, protocol: &str) -> Self {
        if let Some(container) = self.containers.last_mut() {
            container.ports.get_or_insert_with(Vec::new).push(ContainerPort {
                container_port: port,
                protocol: Some(protocol.to_owned()),
                ..Default::default()
            });
        }
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn build(self) -> Deployment {
        let pod_labels = BTreeMap::from([("app".to_owned(), self.name.clone())]);
        Deployment {
            metadata: ObjectMeta {
                uid: Some(format!("{}-uid", self.name)),
                name: Some(self.name),
                namespace: Some(self.namespace),
                labels: (!self.labels.is_empty()).then_some(self.labels),
                deletion_timestamp: self.deleting.then(|| Time(Utc::now())),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(pod_labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: self.containers,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

type Key = (String, String);

fn key(ns: &str, name: &str) -> Key {
    (ns.to_owned(), name.to_owned())
}

/// In-memory cluster that enforces create, patch and delete semantics.
#[derive(Default)]
pub struct FakeCluster {
    workloads: Mutex<BTreeMap<Key, Deployment>>,
    services: Mutex<BTreeMap<Key, Service>>,
    version: AtomicU64,
}

impl FakeCluster {
    /// Store or replace a workload.
    pub fn put_workload(&self, workload: Deployment) {
        let ns = workload.metadata.namespace.clone().unwrap_or_default();
        let name = workload.metadata.name.clone().unwrap_or_default();
        self.workloads.lock().unwrap().insert((ns, name), workload);
    }

    /// Remove a workload, returning its last state.
    pub fn remove_workload(&self, ns: &str, name: &str) -> Option<Deployment> {
        self.workloads.lock().unwrap().remove(&key(ns, name))
    }

    /// Remove a service out of band, returning its last state.
    pub fn remove_service(&self, ns: &str, name: &str) -> Option<Service> {
        self.services.lock().unwrap().remove(&key(ns, name))
    }

    pub fn service(&self, ns: &str, name: &str) -> Option<Service> {
        self.services.lock().unwrap().get(&key(ns, name)).cloned()
    }

    pub fn service_count(&self) -> usize {
        self.services.lock().unwrap().len()
    }

    /// Ports of a stored service as `(name, port, protocol)`.
    pub fn ports(&self, ns: &str, name: &str) -> Option<Vec<(String, i32, String)>> {
        let service = self.service(ns, name)?;
        Some(
            service
                .spec?
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|p| {
                    (
                        p.name.unwrap_or_default(),
                        p.port,
                        p.protocol.unwrap_or_default(),
                    )
                })
                .collect(),
        )
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_workload(&self, ns: &str, name: &str) -> Result<Option<Deployment>, kube::Error> {
        Ok(self.workloads.lock().unwrap().get(&key(ns, name)).cloned())
    }

    async fn get_service(&self, ns: &str, name: &str) -> Result<Option<Service>, kube::Error> {
        Ok(self.service(ns, name))
    }

    async fn create_service(
        &self,
        ns: &str,
        mut service: Service,
    ) -> Result<Outcome<Service>, kube::Error> {
        let name = service.metadata.name.clone().unwrap_or_default();
        let mut services = self.services.lock().unwrap();
        if services.contains_key(&key(ns, &name)) {
            return Ok(Outcome::AlreadyExists);
        }
        service.metadata.resource_version = Some(self.next_version());
        services.insert(key(ns, &name), service.clone());
        Ok(Outcome::Done(service))
    }

    async fn patch_service_ports(
        &self,
        ns: &str,
        name: &str,
        ports: Vec<ServicePort>,
        resource_version: Option<String>,
    ) -> Result<Outcome<Service>, kube::Error> {
        let mut services = self.services.lock().unwrap();
        let Some(service) = services.get_mut(&key(ns, name)) else {
            return Ok(Outcome::NotFound);
        };
        if resource_version.is_some() && resource_version != service.metadata.resource_version {
            return Ok(Outcome::Conflict);
        }
        service.spec.get_or_insert_with(Default::default).ports = Some(ports);
        service.metadata.resource_version = Some(self.next_version());
        Ok(Outcome::Done(service.clone()))
    }

    async fn delete_service(&self, ns: &str, name: &str) -> Result<Outcome<()>, kube::Error> {
        Ok(match self.services.lock().unwrap().remove(&key(ns, name)) {
            Some(_) => Outcome::Done(()),
            None => Outcome::NotFound,
        })
    }
}
