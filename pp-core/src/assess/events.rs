use std::time::Duration;

use futures::stream::BoxStream;
use futures::{
    Stream,
    StreamExt,
    TryStreamExt,
};
use kube::runtime::{
    WatchStreamExt,
    watcher,
};
use tokio::time::timeout;
use tracing::*;

use super::*;
use crate::wait::WaitError;

const STARTED_REASON: &str = "Started";

// Any of these means the registry rejected the credentials we gave it
const AUTH_FAILURE_MESSAGES: [&str; 3] = ["failed to authorize", "illegal base64 data at input byte", "401 UNAUTHORIZED"];
const IMAGE_NOT_FOUND_MESSAGE: &str = "not found";
const MANIFEST_NOT_AUTHORIZED_MESSAGE: &str = "failed to pull manifest Not authorized";

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PodEvents {
    pub event_type: String,
    pub event_description: String,
    pub event_reason: String,
}

impl From<&corev1::Event> for PodEvents {
    fn from(evt: &corev1::Event) -> PodEvents {
        PodEvents {
            event_type: evt.type_.clone().unwrap_or_default(),
            event_description: evt.message.clone().unwrap_or_default(),
            event_reason: evt.reason.clone().unwrap_or_default(),
        }
    }
}

pub fn watch_pod_events(client: kube::Client, pod: &corev1::Pod) -> BoxStream<'static, anyhow::Result<corev1::Event>> {
    let ns = pod.namespace().unwrap_or_default();
    let api: kube::Api<corev1::Event> = kube::Api::namespaced(client, &ns);
    let config = watcher::Config::default().fields(&format!("involvedObject.name={}", pod.name_any()));

    watcher(api, config).applied_objects().map_err(anyhow::Error::from).boxed()
}

pub async fn first_warning_event<S>(mut events: S, pod_name: &str) -> anyhow::Result<PodEvents>
where
    S: Stream<Item = anyhow::Result<corev1::Event>> + Unpin,
{
    while let Some(evt) = events.try_next().await? {
        debug!("event for {pod_name}: {:?} {:?}", evt.reason, evt.message);
        if evt.type_.as_deref() == Some(EVENT_TYPE_WARNING) {
            return Ok(PodEvents::from(&evt));
        }
    }
    bail!(AssessError::no_warning_events(pod_name))
}

pub async fn pod_event_extractor(client: kube::Client, pod: &corev1::Pod, wait_timeout: Duration) -> anyhow::Result<PodEvents> {
    let pod_name = pod.name_any();
    let events = watch_pod_events(client, pod);
    match timeout(wait_timeout, first_warning_event(events, &pod_name)).await {
        Ok(res) => res,
        Err(_) => bail!(WaitError::timeout(&format!("warning event for pod {pod_name}"))),
    }
}

// Decides what an event for a pod pulling from an authenticated registry means; None means the
// event says nothing either way and we should keep watching
pub fn classify_auth_event(evt: &corev1::Event, expected_status: &str) -> Option<EmptyResult> {
    let evt_type = evt.type_.as_deref().unwrap_or_default();
    let message = evt.message.as_deref().unwrap_or_default();
    let expect_success = expected_status == AUTH_STATUS_COMPLETED;

    if evt_type == EVENT_TYPE_NORMAL && evt.reason.as_deref() == Some(STARTED_REASON) {
        return Some(Ok(()));
    }
    if evt_type != EVENT_TYPE_WARNING {
        return None;
    }

    if AUTH_FAILURE_MESSAGES.iter().any(|m| message.contains(m)) {
        if expect_success {
            return Some(Err(AssessError::invalid_credentials(message)));
        }
        return Some(Ok(()));
    }

    if message.contains(IMAGE_NOT_FOUND_MESSAGE) {
        return Some(Err(AssessError::invalid_image_name(message)));
    }

    if message.contains(MANIFEST_NOT_AUTHORIZED_MESSAGE) {
        if expect_success {
            return Some(Err(AssessError::invalid_auth_json_secret(message)));
        }
        return Some(Ok(()));
    }

    None
}

pub async fn authenticated_image_status_from<S>(mut events: S, expected_status: &str, pod_name: &str) -> EmptyResult
where
    S: Stream<Item = anyhow::Result<corev1::Event>> + Unpin,
{
    while let Some(evt) = events.try_next().await? {
        if let Some(res) = classify_auth_event(&evt, expected_status) {
            return res;
        }
    }
    bail!(AssessError::pod_vm_start_error(pod_name))
}

pub async fn get_authenticated_image_status(
    client: kube::Client,
    expected_status: &str,
    pod: &corev1::Pod,
    wait_timeout: Duration,
) -> EmptyResult {
    let pod_name = pod.name_any();
    info!("watching events for {} (expecting {expected_status})", pod.namespaced_name());
    let events = watch_pod_events(client, pod);
    match timeout(wait_timeout, authenticated_image_status_from(events, expected_status, &pod_name)).await {
        Ok(res) => res,
        Err(_) => bail!(WaitError::timeout(&format!("image pull status of pod {pod_name}"))),
    }
}
