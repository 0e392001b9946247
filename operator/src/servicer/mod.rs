//! Keeps a Service in step with every Deployment that carries the serviced label.
mod controller;
pub mod drift;
pub mod ports;
mod reconciler;

#[cfg(test)]
pub mod stub;

use std::collections::BTreeMap;

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Container, Service, ServiceSpec},
};
use kube::{core::ObjectMeta, Resource};

use crate::{labels::managed_labels, Error};

pub use controller::{run, service_loop, workload_loop};
pub use ports::{PortSet, Protocol};
pub use reconciler::{reconcile, Reconciled, WorkloadEvent};

/// Suffix appended to a workload name to name its service.
pub const SERVICE_NAME_SUFFIX: &str = "-service";

/// Name of the service derived from a workload.
pub fn derive_name(workload: &str) -> String {
    format!("{workload}{SERVICE_NAME_SUFFIX}")
}

/// Name of the workload a derived service belongs to.
pub fn owner_name(service: &str) -> Option<&str> {
    service
        .strip_suffix(SERVICE_NAME_SUFFIX)
        .filter(|owner| !owner.is_empty())
}

/// Namespace and name of a workload.
pub(crate) fn workload_key(workload: &Deployment) -> Result<(String, String), Error> {
    let name = workload
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::malformed("<unnamed>", "metadata has no name"))?;
    let namespace = workload
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| Error::malformed(&name, "metadata has no namespace"))?;
    Ok((namespace, name))
}

pub(crate) fn containers(workload: &Deployment) -> Result<&[Container], Error> {
    workload
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod| pod.containers.as_slice())
        .ok_or_else(|| Error::malformed(workload_label(workload), "no pod template spec"))
}

fn selector(workload: &Deployment) -> Result<BTreeMap<String, String>, Error> {
    workload
        .spec
        .as_ref()
        .and_then(|spec| spec.template.metadata.as_ref())
        .and_then(|meta| meta.labels.clone())
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| Error::malformed(workload_label(workload), "pod template has no labels"))
}

fn workload_label(workload: &Deployment) -> &str {
    workload.metadata.name.as_deref().unwrap_or("<unnamed>")
}

/// Build the service a workload should have.
///
/// The selector is the pod template labels and the workload is set as the
/// controlling owner, so garbage collection removes the service with it.
pub fn derived_service(workload: &Deployment, ports: &PortSet) -> Result<Service, Error> {
    let (namespace, name) = workload_key(workload)?;
    let owner = workload
        .controller_owner_ref(&())
        .ok_or_else(|| Error::malformed(&name, "metadata has no uid"))?;
    Ok(Service {
        metadata: ObjectMeta {
            name: Some(derive_name(&name)),
            namespace: Some(namespace),
            labels: managed_labels(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector(workload)?),
            ports: Some(ports.to_service_ports()),
            ..Default::default()
        }),
        ..Default::default()
    })
}
