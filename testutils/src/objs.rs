use pp_core::k8s::new_nginx_pod_with_name;
use pp_core::prelude::*;
use rstest::fixture;

use crate::constants::*;

#[fixture]
pub fn test_pod(#[default(TEST_POD)] name: &str) -> corev1::Pod {
    let mut pod = new_nginx_pod_with_name(TEST_NAMESPACE, name);
    if let Some(spec) = pod.spec.as_mut() {
        spec.node_name = Some(TEST_NODE.into());
    }
    pod.status = Some(corev1::PodStatus { phase: Some(POD_RUNNING.into()), ..Default::default() });
    pod
}

#[fixture]
pub fn test_caa_pod(#[default(TEST_CAA_POD)] name: &str, #[default(TEST_NODE)] node: &str) -> corev1::Pod {
    corev1::Pod {
        metadata: metav1::ObjectMeta {
            name: Some(name.into()),
            namespace: Some(CAA_NAMESPACE.into()),
            labels: klabel!("app" => "cloud-api-adaptor"),
            ..Default::default()
        },
        spec: Some(corev1::PodSpec {
            node_name: Some(node.into()),
            containers: vec![corev1::Container { name: "cloud-api-adaptor-con".into(), ..Default::default() }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_container_state(waiting_reason: Option<&str>, terminated_reason: Option<&str>) -> corev1::ContainerState {
    corev1::ContainerState {
        waiting: waiting_reason.map(|r| corev1::ContainerStateWaiting { reason: Some(r.into()), ..Default::default() }),
        terminated: terminated_reason.map(|r| corev1::ContainerStateTerminated {
            reason: Some(r.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// A pod that looks like it was created by the job controller for `job_name`
pub fn build_job_pod(name: &str, job_name: &str, phase: &str, state: corev1::ContainerState) -> corev1::Pod {
    corev1::Pod {
        metadata: metav1::ObjectMeta {
            name: Some(name.into()),
            namespace: Some(TEST_NAMESPACE.into()),
            labels: klabel!(JOB_NAME_LABEL_KEY => job_name),
            ..Default::default()
        },
        spec: Some(corev1::PodSpec {
            containers: vec![corev1::Container { name: job_name.into(), ..Default::default() }],
            ..Default::default()
        }),
        status: Some(corev1::PodStatus {
            phase: Some(phase.into()),
            container_statuses: Some(vec![corev1::ContainerStatus {
                name: job_name.into(),
                state: Some(state),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn build_event(pod_name: &str, type_: &str, reason: &str, message: &str) -> corev1::Event {
    corev1::Event {
        metadata: metav1::ObjectMeta {
            name: Some(format!("{pod_name}.{}", reason.to_lowercase())),
            namespace: Some(TEST_NAMESPACE.into()),
            ..Default::default()
        },
        involved_object: corev1::ObjectReference {
            kind: Some("Pod".into()),
            name: Some(pod_name.into()),
            namespace: Some(TEST_NAMESPACE.into()),
            ..Default::default()
        },
        type_: Some(type_.into()),
        reason: Some(reason.into()),
        message: Some(message.into()),
        ..Default::default()
    }
}
