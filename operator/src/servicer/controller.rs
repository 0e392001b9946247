use std::sync::Arc;

use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service};
use kube::{Api, ResourceExt};
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    labels::MANAGED_BY_LABEL_SELECTOR,
    retry::retry_with_backoff,
    servicer::{owner_name, reconcile, Reconciled, WorkloadEvent},
    utils::{ClusterClient, Context},
    watch::{Event, Watch},
    Error,
};

/// Run the workload and service loops until `cancel` fires.
pub async fn run<C, R>(cx: Arc<Context<C, R>>, cancel: CancellationToken)
where
    C: ClusterClient + 'static,
    R: RngCore + Send + 'static,
{
    info!(label = %cx.config.label_key, "starting servicer");
    let mut workloads = tokio::spawn(workload_loop(cx.clone(), cancel.clone()));
    let mut services = tokio::spawn(service_loop(cx, cancel.clone()));

    tokio::select! {
        h = &mut workloads => {
            exit("workload loop", h);
            cancel.cancel();
            exit("service loop", services.await);
        }
        h = &mut services => {
            exit("service loop", h);
            cancel.cancel();
            exit("workload loop", workloads.await);
        }
    }
}

fn exit(task: &str, out: Result<(), tokio::task::JoinError>) {
    match out {
        Ok(()) => info!("{task} exited"),
        Err(e) => error!("{task} failed to complete: {e}"),
    }
}

/// Reconcile every deployment in every namespace.
///
/// No label filter is applied, a deployment losing the serviced label must
/// still be seen.
pub async fn workload_loop<C, R>(cx: Arc<Context<C, R>>, cancel: CancellationToken)
where
    C: ClusterClient + 'static,
    R: RngCore + Send + 'static,
{
    let api = Api::<Deployment>::all(cx.k_client.clone());
    let watch = Watch::new(api, "workloads", cx.config.watch.clone());
    watch
        .run(cancel.clone(), move |event| {
            let cx = cx.clone();
            let cancel = cancel.clone();
            async move { handle_workload_event(&cx, &cancel, event).await }
        })
        .await
}

/// Recreate managed services that were deleted while their workload still wants one.
pub async fn service_loop<C, R>(cx: Arc<Context<C, R>>, cancel: CancellationToken)
where
    C: ClusterClient + 'static,
    R: RngCore + Send + 'static,
{
    let api = Api::<Service>::all(cx.k_client.clone());
    let watch =
        Watch::new(api, "services", cx.config.watch.clone()).labels(MANAGED_BY_LABEL_SELECTOR);
    watch
        .run(cancel.clone(), move |event| {
            let cx = cx.clone();
            let cancel = cancel.clone();
            async move { handle_service_event(&cx, &cancel, event).await }
        })
        .await
}

async fn handle_workload_event(
    cx: &Context<impl ClusterClient, impl RngCore>,
    cancel: &CancellationToken,
    event: WorkloadEvent,
) {
    let workload = event.object();
    let namespace = workload.namespace().unwrap_or_default();
    let name = workload.name_any();
    let result = retry_with_backoff(
        &cx.config.retry,
        &cx.rng,
        cancel,
        "reconcile workload",
        Error::is_retryable,
        || reconcile(cx, &event),
    )
    .await;
    match result {
        Ok(outcome) => debug!(%namespace, %name, ?outcome, "workload reconciled"),
        Err(err) => warn!(%namespace, %name, %err, "dropping workload event"),
    }
}

async fn handle_service_event(
    cx: &Context<impl ClusterClient, impl RngCore>,
    cancel: &CancellationToken,
    event: Event<Service>,
) {
    let Event::Deleted(service) = event else {
        return;
    };
    let name = service.name_any();
    let Some(namespace) = service.namespace() else {
        return;
    };
    let Some(owner) = owner_name(&name) else {
        debug!(%namespace, %name, "deleted service has no owning workload name");
        return;
    };
    info!(%namespace, %name, "managed service deleted");
    let result = retry_with_backoff(
        &cx.config.retry,
        &cx.rng,
        cancel,
        "restore service",
        Error::is_retryable,
        || restore(cx, &namespace, owner),
    )
    .await;
    match result {
        Ok(outcome) => debug!(%namespace, %name, ?outcome, "service restore handled"),
        Err(err) => warn!(%namespace, %name, %err, "dropping service event"),
    }
}

// Replay the owning workload as newly added, which creates the service if it is still wanted.
async fn restore(
    cx: &Context<impl ClusterClient, impl RngCore>,
    namespace: &str,
    owner: &str,
) -> Result<Reconciled, Error> {
    match cx.cluster.get_workload(namespace, owner).await? {
        Some(workload) => reconcile(cx, &Event::Added(workload)).await,
        None => {
            debug!(%namespace, workload = %owner, "owning workload is gone");
            Ok(Reconciled::Skipped)
        }
    }
}
