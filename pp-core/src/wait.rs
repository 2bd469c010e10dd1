use std::future::Future;
use std::time::Duration;

use tokio::time::{
    Instant,
    sleep,
};
use tracing::*;

use crate::errors::*;
use crate::k8s::{
    NamespacedObj,
    namespaced_api,
};
use crate::prelude::*;

err_impl! {WaitError,
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

pub fn default_interval() -> Duration {
    Duration::from_secs(RETRY_DELAY_SECONDS)
}

// Poll `condition` every `interval` until it yields a value; errors from the condition abort the
// wait immediately.  The condition is always checked at least once, even with a zero timeout.
pub async fn poll_until<T, F, Fut>(what: &str, timeout: Duration, interval: Duration, mut condition: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(val) = condition().await? {
            return Ok(val);
        }

        let now = Instant::now();
        if now >= deadline {
            bail!(WaitError::timeout(what));
        }
        sleep(interval.min(deadline - now)).await;
    }
}

pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, interval: Duration, mut condition: F) -> EmptyResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    poll_until(what, timeout, interval, || {
        let fut = condition();
        async move { Ok(fut.await?.then_some(())) }
    })
    .await
}

// Returns the first version of the object that satisfies the predicate
pub async fn wait_for_resource_match<K, P>(
    api: &kube::Api<K>,
    name: &str,
    timeout: Duration,
    predicate: P,
) -> anyhow::Result<K>
where
    K: NamespacedObj,
    P: Fn(&K) -> bool,
{
    let what = format!("{} {name} to match", K::kind(&()));
    let predicate = &predicate;
    poll_until(&what, timeout, default_interval(), move || async move {
        let obj = api.get(name).await?;
        Ok(predicate(&obj).then_some(obj))
    })
    .await
}

pub async fn wait_for_deleted<K: NamespacedObj>(api: &kube::Api<K>, name: &str, timeout: Duration) -> EmptyResult {
    let what = format!("{} {name} to be deleted", K::kind(&()));
    wait_for(&what, timeout, default_interval(), move || async move {
        Ok(api.get_opt(name).await?.is_none())
    })
    .await
}

pub async fn wait_for_pod_phase(
    client: kube::Client,
    pod: &corev1::Pod,
    phase: &str,
    timeout: Duration,
) -> anyhow::Result<corev1::Pod> {
    let api = namespaced_api(client, pod)?;
    info!("waiting up to {}s for pod {} to be {phase}", timeout.as_secs(), pod.namespaced_name());
    wait_for_resource_match(&api, &pod.name_any(), timeout, |p: &corev1::Pod| {
        let current = p.phase().unwrap_or("Unknown");
        debug!("pod {} is currently {current}", p.name_any());
        current == phase
    })
    .await
}

pub fn job_finished(job: &batchv1::Job) -> bool {
    let Some(status) = job.status.as_ref() else {
        return false;
    };

    let finished_condition = status.conditions.as_ref().is_some_and(|conds| {
        conds
            .iter()
            .any(|c| (c.type_ == "Complete" || c.type_ == "Failed") && c.status == "True")
    });
    finished_condition || status.succeeded.unwrap_or(0) > 0
}

pub async fn wait_for_job_finished(client: kube::Client, job: &batchv1::Job, timeout: Duration) -> anyhow::Result<batchv1::Job> {
    let api = namespaced_api(client, job)?;
    info!("waiting up to {}s for job {} to finish", timeout.as_secs(), job.namespaced_name());
    wait_for_resource_match(&api, &job.name_any(), timeout, job_finished).await
}

pub async fn wait_for_deployment_available(
    client: kube::Client,
    deployment: &appsv1::Deployment,
    replicas: i32,
) -> anyhow::Result<appsv1::Deployment> {
    let api = namespaced_api(client, deployment)?;
    wait_for_resource_match(
        &api,
        &deployment.name_any(),
        Duration::from_secs(WAIT_DEPLOYMENT_AVAILABLE_TIMEOUT_SECONDS),
        |d: &appsv1::Deployment| {
            let available = d.status.as_ref().and_then(|s| s.available_replicas).unwrap_or(0);
            info!("current deployment available replicas: {available}");
            available == replicas
        },
    )
    .await
}

pub async fn wait_for_cluster_ip(client: kube::Client, svc: &corev1::Service) -> anyhow::Result<String> {
    let api = namespaced_api(client, svc)?;
    let svc = wait_for_resource_match(
        &api,
        &svc.name_any(),
        Duration::from_secs(WAIT_DEPLOYMENT_AVAILABLE_TIMEOUT_SECONDS),
        |s: &corev1::Service| {
            let found = s.spec.as_ref().and_then(|spec| spec.cluster_ip.as_ref()).is_some_and(|ip| !ip.is_empty());
            if !found {
                info!("service {} does not have a cluster IP yet", s.name_any());
            }
            found
        },
    )
    .await?;

    Ok(svc.spec.and_then(|s| s.cluster_ip).unwrap_or_default())
}

#[cfg(test)]
mod tests;
