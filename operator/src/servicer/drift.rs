//! Existence and drift checks for derived services.
//!
//! Every lookup is scoped to the namespace of the workload.
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service};

use crate::{
    servicer::{derive_name, workload_key, PortSet},
    utils::ClusterClient,
    Error,
};

/// What is currently stored for a workload's service.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentService {
    /// Normalised ports of the service
    pub ports: PortSet,
    /// Version the ports were read at
    pub resource_version: Option<String>,
}

impl CurrentService {
    fn from_service(service: &Service) -> Self {
        let ports = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_deref())
            .unwrap_or_default();
        Self {
            ports: PortSet::from_service_ports(ports),
            resource_version: service.metadata.resource_version.clone(),
        }
    }
}

/// Service state compared with what the workload asks for.
#[derive(Clone, Debug, PartialEq)]
pub enum Observed {
    /// No service exists.
    Absent,
    /// A service exists.
    Present {
        /// Its ports differ from the projection
        drift: bool,
        /// Version to guard a patch with
        resource_version: Option<String>,
    },
}

/// Read the ports of a workload's service, `None` when it does not exist.
pub async fn current_ports(
    cluster: &impl ClusterClient,
    workload: &Deployment,
) -> Result<Option<CurrentService>, Error> {
    let (ns, name) = workload_key(workload)?;
    let service = cluster.get_service(&ns, &derive_name(&name)).await?;
    Ok(service.as_ref().map(CurrentService::from_service))
}

/// Reports whether a workload's service exists.
pub async fn exists(cluster: &impl ClusterClient, workload: &Deployment) -> Result<bool, Error> {
    Ok(current_ports(cluster, workload).await?.is_some())
}

/// Compare the stored service with the wanted ports.
pub async fn observe(
    cluster: &impl ClusterClient,
    workload: &Deployment,
    wanted: &PortSet,
) -> Result<Observed, Error> {
    Ok(match current_ports(cluster, workload).await? {
        None => Observed::Absent,
        Some(current) => Observed::Present {
            drift: has_drift(&current.ports, wanted),
            resource_version: current.resource_version,
        },
    })
}

/// Drift is any difference in port number, protocol or name.
pub fn has_drift(current: &PortSet, wanted: &PortSet) -> bool {
    current != wanted
}
