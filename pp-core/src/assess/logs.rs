use std::time::Duration;

use chrono::{
    NaiveTime,
    TimeDelta,
};
use kube::api::ListParams;
use tokio::time::sleep;
use tracing::*;

use super::*;
use crate::k8s::read_pod_logs;

const PULL_IMAGE_START: &str = "calling PullImage for";
const PULL_IMAGE_END: &str = "successfully pulled image";

pub fn time_extractor(line: &str) -> anyhow::Result<NaiveTime> {
    let re = Regex::new(r"\b(\d{2}):(\d{2}):(\d{2})\b")?;
    let Some(m) = re.find(line) else {
        bail!(AssessError::invalid_time_data(line));
    };

    NaiveTime::parse_from_str(m.as_str(), "%H:%M:%S").map_err(|_| AssessError::invalid_time_data(line))
}

// Walks the CAA log from newest to oldest: every "pulled" line for the image moves the end time
// back until we hit the most recent "PullImage" call, which is where the pull started.
pub fn image_pull_time(caa_log: &str, image: &str) -> anyhow::Result<Duration> {
    let start_marker = format!("{PULL_IMAGE_START} \"{image}\"");
    let end_marker = format!("{PULL_IMAGE_END} \"{image}\"");

    let mut start = None;
    let mut end = None;
    for line in caa_log.lines().rev() {
        if line.contains(&start_marker) {
            start = Some(time_extractor(line)?);
            break;
        }
        if line.contains(&end_marker) {
            end = Some(time_extractor(line)?);
        }
    }

    let (Some(start), Some(end)) = (start, end) else {
        bail!(AssessError::image_pull_not_found(image));
    };

    // the CAA log only has wall-clock times, so a pull that straddles midnight looks negative
    let mut elapsed = end - start;
    if elapsed < TimeDelta::zero() {
        elapsed += TimeDelta::days(1);
    }
    Ok(elapsed.to_std()?)
}

// The CAA pod on the same node as the peer pod is the one that created its PodVM
pub async fn find_caa_pod(client: kube::Client, pod: &corev1::Pod) -> anyhow::Result<corev1::Pod> {
    let api: kube::Api<corev1::Pod> = kube::Api::namespaced(client, CAA_NAMESPACE);
    let caa_pods = api.list(&ListParams::default().labels(CAA_POD_LABEL_SELECTOR)).await?.items;

    let node = pod.spec.as_ref().and_then(|s| s.node_name.as_deref());
    let same_node = caa_pods
        .iter()
        .position(|p| node.is_some() && p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == node);

    match same_node {
        Some(i) => Ok(caa_pods[i].clone()),
        None => caa_pods
            .into_iter()
            .next()
            .ok_or_else(|| AssessError::caa_pod_not_found(CAA_NAMESPACE)),
    }
}

pub async fn watch_image_pull_time(client: kube::Client, caa_pod: &corev1::Pod, pod: &corev1::Pod) -> anyhow::Result<String> {
    if pod.phase() != Some(POD_RUNNING) {
        bail!(AssessError::pod_not_running(&pod.namespaced_name()));
    }

    let image = pod.first_container()?.image.clone().unwrap_or_default();
    let caa_ns = caa_pod.namespace().unwrap_or_else(|| CAA_NAMESPACE.into());
    let caa_log = read_pod_logs(client, &caa_ns, &caa_pod.name_any(), None).await?;
    if caa_log.is_empty() {
        bail!(AssessError::empty_log(&caa_pod.namespaced_name()));
    }

    let elapsed = image_pull_time(&caa_log, &image)?;
    Ok(humantime::format_duration(elapsed).to_string())
}

// Returns the (trimmed) logs of the pod whether or not they match, so that callers can report them
pub async fn check_pod_logs(
    client: kube::Client,
    pod: &corev1::Pod,
    expected: &str,
) -> (String, EmptyResult) {
    let ns = pod.namespace().unwrap_or_default();
    let api: kube::Api<corev1::Pod> = kube::Api::namespaced(client.clone(), &ns);

    let res = match api.list(&ListParams::default()).await {
        Ok(pods) => pods.items.into_iter().find(|p| p.name_any() == pod.name_any()),
        Err(err) => return (String::new(), Err(err.into())),
    };

    let log = match res {
        Some(p) => match read_pod_logs(client, &ns, &p.name_any(), None).await {
            Ok(log) => log.trim().to_string(),
            Err(err) => {
                warn!("could not read logs for {}: {err}", p.namespaced_name());
                String::new()
            },
        },
        None => String::new(),
    };

    if log.contains(expected) {
        (log, Ok(()))
    } else {
        (log, Err(AssessError::unexpected_log(expected)))
    }
}

pub async fn compare_pod_log_string(
    client: kube::Client,
    pod: &corev1::Pod,
    expected: &str,
) -> (String, EmptyResult) {
    // give the container a chance to start up and write its output
    sleep(Duration::from_secs(LOG_SETTLE_SECONDS)).await;
    check_pod_logs(client, pod, expected).await
}
