use std::sync::Arc;
use std::time::Duration;

use kube::api::{
    DeleteParams,
    PostParams,
};
use pp_core::errors::*;
use pp_core::feature::Feature;
use pp_core::k8s::*;
use pp_core::prelude::*;
use pp_core::wait::*;
use tokio::time::sleep;
use tracing::*;

use crate::cases::DEFAULT_NAMESPACE;

const DEPLOYMENT_NAME: &str = "nginx-deployment";
const SERVICE_NAME: &str = "nginx-service";
const VERIFY_POD_NAME: &str = "verify-pod";
const REPLICAS: i32 = 2;
const DEFAULT_STARTUP_FAILURE_THRESHOLD: i32 = 3;
const NAMESPACE_NAME_LEN: usize = 7;

err_impl! {RollingUpdateError,
    #[error("verify pod lost its connection to the service: {0}")]
    ConnectionLost(String),

    #[error("CAA daemonset has no containers: {0}")]
    NoContainers(String),

    #[error("CAA daemonset container has no startup probe: {0}")]
    NoStartupProbe(String),
}

// "default" already fills the name length, so this always lands in the default namespace
pub(crate) fn rolling_update_namespace() -> String {
    random_name(DEFAULT_NAMESPACE, NAMESPACE_NAME_LEN)
}

pub fn caa_daemonset_rolling_update(assert: Arc<dyn RollingUpdateAssert>) -> Feature {
    rolling_update_feature(assert, &rolling_update_namespace(), Duration::from_secs(OLD_VM_DELETION_TIMEOUT_SECONDS))
}

pub(crate) fn rolling_update_feature(assert: Arc<dyn RollingUpdateAssert>, namespace: &str, deletion_wait: Duration) -> Feature {
    let setup_assert = assert.clone();
    let (setup_ns, assess_ns, teardown_ns) = (namespace.to_string(), namespace.to_string(), namespace.to_string());
    Feature::new("CAA DaemonSet upgrade test")
        .with_setup("create nginx deployment and service", move |client| async move {
            setup(client, &setup_ns, setup_assert.as_ref()).await
        })
        .assess("access for upgrade test", move |client| async move {
            assess(client, &assess_ns, assert.as_ref(), deletion_wait).await
        })
        .teardown(move |client| async move { teardown(client, &teardown_ns).await })
}

fn deployment(namespace: &str) -> appsv1::Deployment {
    new_nginx_deployment(namespace, DEPLOYMENT_NAME, REPLICAS)
}

fn service(namespace: &str) -> corev1::Service {
    new_nginx_service(namespace, SERVICE_NAME)
}

async fn setup(client: kube::Client, namespace: &str, assert: &dyn RollingUpdateAssert) -> EmptyResult {
    ensure_namespace(client.clone(), namespace).await?;

    let depl = create_obj(client.clone(), &deployment(namespace)).await?;
    wait_for_deployment_available(client.clone(), &depl, REPLICAS).await?;
    info!("nginx deployment is available now");
    assert.cache_pod_vm_ids(DEPLOYMENT_NAME).await?;

    let svc = create_obj(client.clone(), &service(namespace)).await?;
    let cluster_ip = wait_for_cluster_ip(client.clone(), &svc).await?;
    info!("nginx service is available on cluster IP: {cluster_ip}");

    let verify_pod = create_obj(client.clone(), &new_verify_pod(namespace, VERIFY_POD_NAME, &cluster_ip)).await?;
    wait_for_pod_phase(client, &verify_pod, POD_RUNNING, Duration::from_secs(WAIT_POD_RUNNING_TIMEOUT_SECONDS)).await?;
    Ok(())
}

// Any change to the pod template rolls the daemonset; the probe has to exist already, since the
// apiserver rejects a startup probe without a handler
pub fn bump_startup_failure_threshold(ds: &mut appsv1::DaemonSet) -> anyhow::Result<i32> {
    let container = ds
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .and_then(|s| s.containers.first_mut())
        .ok_or_else(|| RollingUpdateError::no_containers(CAA_DAEMONSET_NAME))?;
    let probe = container
        .startup_probe
        .as_mut()
        .ok_or_else(|| RollingUpdateError::no_startup_probe(CAA_DAEMONSET_NAME))?;
    let threshold = probe.failure_threshold.unwrap_or(DEFAULT_STARTUP_FAILURE_THRESHOLD) + 1;
    probe.failure_threshold = Some(threshold);
    Ok(threshold)
}

async fn assess(
    client: kube::Client,
    namespace: &str,
    assert: &dyn RollingUpdateAssert,
    deletion_wait: Duration,
) -> EmptyResult {
    let ds_api: kube::Api<appsv1::DaemonSet> = kube::Api::namespaced(client.clone(), CAA_NAMESPACE);
    let mut ds = ds_api.get(CAA_DAEMONSET_NAME).await?;
    let threshold = bump_startup_failure_threshold(&mut ds)?;
    info!("forcing a CAA rollout by setting the startup probe failure threshold to {threshold}");
    ds_api.replace(CAA_DAEMONSET_NAME, &PostParams::default(), &ds).await?;

    wait_for_deployment_available(client.clone(), &deployment(namespace), REPLICAS).await?;

    let pod_api: kube::Api<corev1::Pod> = kube::Api::namespaced(client.clone(), namespace);
    let verify_pod = pod_api.get(VERIFY_POD_NAME).await?;
    let phase = verify_pod.phase().unwrap_or("Unknown");
    info!("verify pod status: {phase}");
    if phase != POD_RUNNING {
        match read_pod_logs(client, namespace, VERIFY_POD_NAME, None).await {
            Ok(logs) => error!("verify pod logs:\n{logs}"),
            Err(err) => warn!("failed to get verify pod logs: {err}"),
        }
        bail!(RollingUpdateError::connection_lost(phase));
    }

    info!("waiting {}s for the old PodVMs to be deleted", deletion_wait.as_secs());
    sleep(deletion_wait).await;
    assert.verify_old_vm_deleted().await
}

async fn teardown(client: kube::Client, namespace: &str) -> EmptyResult {
    let params = DeleteParams::default();
    join_errors([
        delete_obj(client.clone(), &new_verify_pod(namespace, VERIFY_POD_NAME, ""), &params).await,
        delete_obj(client.clone(), &service(namespace), &params).await,
        delete_obj(client, &deployment(namespace), &params).await,
    ])
}
