use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

use httpmock::Method::*;
use pp_testutils::*;
use rstest::*;
use serde_json::json;
use tracing_test::traced_test;

use super::*;

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_poll_until_eventually_succeeds() {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let res = poll_until("the third try", Duration::from_secs(60), default_interval(), move || async move {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((n == 3).then_some(n))
    })
    .await
    .unwrap();

    assert_eq!(res, 3);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_poll_until_timeout() {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let err = wait_for("something that never happens", Duration::from_secs(12), default_interval(), move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    })
    .await
    .unwrap_err()
    .downcast::<WaitError>()
    .unwrap();

    assert!(matches!(err, WaitError::Timeout(..)));
    // checks at 0s, 5s, 10s, and the 12s deadline
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[rstest]
#[tokio::test]
async fn test_poll_until_zero_timeout_checks_once() {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let res = wait_for("an immediate answer", Duration::ZERO, default_interval(), move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    })
    .await;

    assert!(res.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_poll_until_condition_error_aborts() {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let err = wait_for("a broken condition", Duration::from_secs(60), default_interval(), move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("the apiserver is on fire"))
    })
    .await
    .unwrap_err();

    assert!(err.downcast_ref::<WaitError>().is_none());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

fn build_job_with_status(status: Option<batchv1::JobStatus>) -> batchv1::Job {
    batchv1::Job { status, ..Default::default() }
}

fn job_condition(type_: &str, status: &str) -> batchv1::JobCondition {
    batchv1::JobCondition {
        type_: type_.into(),
        status: status.into(),
        ..Default::default()
    }
}

#[rstest]
#[case::no_status(None, false)]
#[case::running(Some(batchv1::JobStatus { active: Some(1), ..Default::default() }), false)]
#[case::succeeded(Some(batchv1::JobStatus { succeeded: Some(1), ..Default::default() }), true)]
#[case::complete(
    Some(batchv1::JobStatus { conditions: Some(vec![job_condition("Complete", "True")]), ..Default::default() }),
    true
)]
#[case::failed(
    Some(batchv1::JobStatus { conditions: Some(vec![job_condition("Failed", "True")]), ..Default::default() }),
    true
)]
#[case::suspended(
    Some(batchv1::JobStatus { conditions: Some(vec![job_condition("Suspended", "True")]), ..Default::default() }),
    false
)]
fn test_job_finished(#[case] status: Option<batchv1::JobStatus>, #[case] expected: bool) {
    assert_eq!(job_finished(&build_job_with_status(status)), expected);
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_wait_for_pod_phase(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    let running_pod = test_pod.clone();
    fake_apiserver
        .handle(move |when, then| {
            when.method(GET).path(pod_path(TEST_NAMESPACE, TEST_POD));
            then.json_body_obj(&running_pod);
        })
        .build();

    let pod = wait_for_pod_phase(client, &test_pod, POD_RUNNING, Duration::from_secs(10)).await.unwrap();
    assert_eq!(pod.phase(), Some(POD_RUNNING));
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_wait_for_pod_phase_timeout(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    let mut pending_pod = test_pod.clone();
    pending_pod.status = Some(corev1::PodStatus { phase: Some(POD_PENDING.into()), ..Default::default() });
    fake_apiserver
        .handle(move |when, then| {
            when.method(GET).path(pod_path(TEST_NAMESPACE, TEST_POD));
            then.json_body_obj(&pending_pod);
        })
        .build();

    let err = wait_for_pod_phase(client, &test_pod, POD_RUNNING, Duration::ZERO).await.unwrap_err();
    assert!(matches!(err.downcast::<WaitError>().unwrap(), WaitError::Timeout(..)));
    assert!(logs_contain("is currently Pending"));
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_wait_for_deleted(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver.handle_not_found(pod_path(TEST_NAMESPACE, TEST_POD)).build();

    let api: kube::Api<corev1::Pod> = kube::Api::namespaced(client, TEST_NAMESPACE);
    wait_for_deleted(&api, &test_pod.name_any(), Duration::ZERO).await.unwrap();
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_wait_for_cluster_ip() {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    let svc = crate::k8s::new_nginx_service(TEST_NAMESPACE, "nginx-service");
    fake_apiserver
        .handle(|when, then| {
            when.method(GET)
                .path(format!("/api/v1/namespaces/{TEST_NAMESPACE}/services/nginx-service"));
            then.json_body(json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": {"name": "nginx-service", "namespace": TEST_NAMESPACE},
                "spec": {"clusterIP": "10.96.0.42"},
            }));
        })
        .build();

    let ip = wait_for_cluster_ip(client, &svc).await.unwrap();
    assert_eq!(ip, "10.96.0.42");
    fake_apiserver.assert();
}
