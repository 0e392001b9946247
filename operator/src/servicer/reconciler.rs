use k8s_openapi::api::apps::v1::Deployment;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::{
    labels::is_serviced,
    servicer::{
        containers, derive_name, derived_service,
        drift::{exists, observe, Observed},
        ports::{project, PortSet},
        workload_key,
    },
    utils::{ClusterClient, Context, Outcome},
    watch::Event,
    Error,
};

/// A change to a workload as delivered by the workload watch.
pub type WorkloadEvent = Event<Deployment>;

/// What a reconciliation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// The service was created.
    Created,
    /// Create found the service already there.
    AlreadyExisted,
    /// The service ports were replaced.
    Patched,
    /// The service was deleted.
    Deleted,
    /// Delete or patch found no service.
    AlreadyAbsent,
    /// The service already matches the workload.
    Unchanged,
    /// Nothing to do for this workload.
    Skipped,
}

/// Bring the derived service of the event's workload in line with the workload.
///
/// Every decision reads the service from the cluster first, no state is kept
/// between events.
pub async fn reconcile(
    cx: &Context<impl ClusterClient, impl RngCore>,
    event: &WorkloadEvent,
) -> Result<Reconciled, Error> {
    let workload = event.object();
    let serviced = is_serviced(workload.metadata.labels.as_ref(), &cx.config.label_key);
    let deleting = workload.metadata.deletion_timestamp.is_some();

    match event {
        Event::Added(_) if serviced && !deleting => create(cx, workload).await,
        Event::Added(_) | Event::Deleted(_) if serviced => delete(cx, workload).await,
        Event::Added(_) | Event::Deleted(_) => Ok(Reconciled::Skipped),
        Event::Modified(_) if serviced && !deleting => sync(cx, workload).await,
        Event::Modified(_) => {
            if exists(&cx.cluster, workload).await? {
                delete(cx, workload).await
            } else {
                Ok(Reconciled::Skipped)
            }
        }
    }
}

/// Ports the workload asks for, `None` when it declares none.
fn wanted_ports(workload: &Deployment) -> Result<Option<PortSet>, Error> {
    let (_, name) = workload_key(workload)?;
    let ports = project(&name, containers(workload)?)?;
    if ports.is_empty() {
        warn!(workload = %name, "workload declares no container ports");
        return Ok(None);
    }
    Ok(Some(ports))
}

async fn create(
    cx: &Context<impl ClusterClient, impl RngCore>,
    workload: &Deployment,
) -> Result<Reconciled, Error> {
    let Some(ports) = wanted_ports(workload)? else {
        return Ok(Reconciled::Skipped);
    };
    create_with(cx, workload, &ports).await
}

async fn create_with(
    cx: &Context<impl ClusterClient, impl RngCore>,
    workload: &Deployment,
    ports: &PortSet,
) -> Result<Reconciled, Error> {
    let (ns, name) = workload_key(workload)?;
    let service = derived_service(workload, ports)?;
    let service_name = derive_name(&name);
    match cx.cluster.create_service(&ns, service).await? {
        Outcome::Done(_) => {
            info!(namespace = %ns, service = %service_name, ports = ports.len(), "created service");
            Ok(Reconciled::Created)
        }
        Outcome::AlreadyExists => {
            info!(namespace = %ns, service = %service_name, "service already exists");
            Ok(Reconciled::AlreadyExisted)
        }
        Outcome::NotFound => {
            info!(namespace = %ns, service = %service_name, "namespace is gone");
            Ok(Reconciled::Skipped)
        }
        Outcome::Conflict => Err(Error::Conflict {
            namespace: ns,
            name: service_name,
        }),
    }
}

async fn delete(
    cx: &Context<impl ClusterClient, impl RngCore>,
    workload: &Deployment,
) -> Result<Reconciled, Error> {
    let (ns, name) = workload_key(workload)?;
    let service_name = derive_name(&name);
    match cx.cluster.delete_service(&ns, &service_name).await? {
        Outcome::Done(()) => {
            info!(namespace = %ns, service = %service_name, "deleted service");
            Ok(Reconciled::Deleted)
        }
        Outcome::AlreadyExists => Err(Error::unexpected(
            ns,
            service_name,
            "delete",
            "AlreadyExists",
        )),
        Outcome::NotFound => {
            info!(namespace = %ns, service = %service_name, "service already deleted");
            Ok(Reconciled::AlreadyAbsent)
        }
        Outcome::Conflict => Err(Error::Conflict {
            namespace: ns,
            name: service_name,
        }),
    }
}

// Create when missing, otherwise patch the ports if they drifted.
async fn sync(
    cx: &Context<impl ClusterClient, impl RngCore>,
    workload: &Deployment,
) -> Result<Reconciled, Error> {
    let Some(ports) = wanted_ports(workload)? else {
        return Ok(Reconciled::Skipped);
    };
    let resource_version = match observe(&cx.cluster, workload, &ports).await? {
        Observed::Absent => return create_with(cx, workload, &ports).await,
        Observed::Present { drift: false, .. } => return Ok(Reconciled::Unchanged),
        Observed::Present {
            drift: true,
            resource_version,
        } => resource_version,
    };

    let (ns, name) = workload_key(workload)?;
    let service_name = derive_name(&name);
    debug!(namespace = %ns, service = %service_name, ?resource_version, "ports drifted");
    match cx
        .cluster
        .patch_service_ports(&ns, &service_name, ports.to_service_ports(), resource_version)
        .await?
    {
        Outcome::Done(_) => {
            info!(namespace = %ns, service = %service_name, ports = ports.len(), "patched service ports");
            Ok(Reconciled::Patched)
        }
        Outcome::AlreadyExists => Err(Error::unexpected(
            ns,
            service_name,
            "patch",
            "AlreadyExists",
        )),
        Outcome::NotFound => {
            info!(namespace = %ns, service = %service_name, "service deleted before patch");
            Ok(Reconciled::AlreadyAbsent)
        }
        Outcome::Conflict => Err(Error::Conflict {
            namespace: ns,
            name: service_name,
        }),
    }
}
