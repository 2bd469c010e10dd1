use kube::api::ListParams;
use tracing::*;

use super::*;
use crate::k8s::read_pod_logs;

const CONTAINER_CREATING_REASON: &str = "ContainerCreating";
const START_ERROR_REASON: &str = "StartError";
const COMPLETED_REASON: &str = "Completed";

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobPodTally {
    pub successful: usize,
    pub errored: usize,

    // names of the pods whose container ran to completion, in list order
    pub completed: Vec<String>,
}

pub fn tally_job_pods(pods: &[corev1::Pod], job_name: &str) -> anyhow::Result<JobPodTally> {
    let mut tally = JobPodTally::default();
    for pod in pods {
        if pod.labels().get(JOB_NAME_LABEL_KEY).map(String::as_str) != Some(job_name) {
            continue;
        }

        let state = pod.first_container_state();
        if pod.phase() == Some(POD_PENDING) {
            let waiting_reason = state.and_then(|s| s.waiting.as_ref()).and_then(|w| w.reason.as_deref());
            if waiting_reason == Some(CONTAINER_CREATING_REASON) {
                bail!(AssessError::pod_vm_create_failed(&pod.namespaced_name()));
            }
        }

        match state.and_then(|s| s.terminated.as_ref()).and_then(|t| t.reason.as_deref()) {
            Some(START_ERROR_REASON) => {
                warn!("{} - {START_ERROR_REASON}", pod.name_any());
                tally.errored += 1;
            },
            Some(COMPLETED_REASON) => {
                tally.successful += 1;
                tally.completed.push(pod.name_any());
            },
            _ => (),
        }
    }
    Ok(tally)
}

// Returns (successful, errored, log of the last successful pod)
pub async fn get_successful_and_errored_pods(
    client: kube::Client,
    job: &batchv1::Job,
) -> anyhow::Result<(usize, usize, String)> {
    let ns = job.namespace().unwrap_or_default();
    let job_name = job.name_any();
    let api: kube::Api<corev1::Pod> = kube::Api::namespaced(client.clone(), &ns);
    let selector = format!("{JOB_NAME_LABEL_KEY}={job_name}");
    let pods = api.list(&ListParams::default().labels(&selector)).await?.items;

    let tally = tally_job_pods(&pods, &job_name)?;
    let mut log = String::new();
    for pod_name in &tally.completed {
        log = read_pod_logs(client.clone(), &ns, pod_name, None).await?.trim().to_string();
        info!("{pod_name} - {COMPLETED_REASON} - log: {log}");
    }

    Ok((tally.successful, tally.errored, log))
}
