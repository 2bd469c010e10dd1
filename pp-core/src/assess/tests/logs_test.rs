use std::time::Duration;

use chrono::NaiveTime;
use httpmock::Method::*;
use serde_json::json;

use super::*;

const CAA_LOG: &str = r#"
2024/05/01 23:59:40 [adaptor/proxy] CreateContainer: containerID:abc
2024/05/01 10:00:01 [adaptor/proxy] calling PullImage for "nginx" before CreateContainer (cid: "abc")
2024/05/01 10:00:31 [adaptor/proxy] successfully pulled image "nginx"
2024/05/01 10:05:00 [adaptor/proxy] calling PullImage for "quay.io/confidential-containers/test-images:largeimage" before CreateContainer (cid: "def")
2024/05/01 10:07:15 [adaptor/proxy] successfully pulled image "quay.io/confidential-containers/test-images:largeimage"
"#;

#[rstest]
#[case::with_date("2024/05/01 10:00:31 some message", "10:00:31")]
#[case::bare("at 23:59:59", "23:59:59")]
#[case::first_match("12:00:00 then 13:00:00", "12:00:00")]
fn test_time_extractor(#[case] line: &str, #[case] expected: &str) {
    let expected = NaiveTime::parse_from_str(expected, "%H:%M:%S").unwrap();
    assert_eq!(time_extractor(line).unwrap(), expected);
}

#[rstest]
#[case::no_time("nothing to see here")]
#[case::not_word_bounded("1234:56:789")]
#[case::out_of_range("99:99:99")]
fn test_time_extractor_invalid(#[case] line: &str) {
    let err = time_extractor(line).unwrap_err().downcast::<AssessError>().unwrap();
    assert!(matches!(err, AssessError::InvalidTimeData(..)));
}

#[rstest]
#[case::small_image("nginx", 30)]
#[case::large_image("quay.io/confidential-containers/test-images:largeimage", 135)]
fn test_image_pull_time(#[case] image: &str, #[case] expected_secs: u64) {
    assert_eq!(image_pull_time(CAA_LOG, image).unwrap(), Duration::from_secs(expected_secs));
}

#[rstest]
fn test_image_pull_time_uses_most_recent_pull() {
    let log = r#"
01:00:00 calling PullImage for "nginx"
01:10:00 successfully pulled image "nginx"
02:00:00 calling PullImage for "nginx"
02:00:05 successfully pulled image "nginx"
"#;
    assert_eq!(image_pull_time(log, "nginx").unwrap(), Duration::from_secs(5));
}

#[rstest]
fn test_image_pull_time_across_midnight() {
    let log = r#"
23:59:50 calling PullImage for "nginx"
00:00:10 successfully pulled image "nginx"
"#;
    assert_eq!(image_pull_time(log, "nginx").unwrap(), Duration::from_secs(20));
}

#[rstest]
#[case::no_start("10:00:31 successfully pulled image \"nginx\"")]
#[case::no_end("10:00:01 calling PullImage for \"nginx\"")]
#[case::other_image(CAA_LOG)]
fn test_image_pull_time_missing_markers(#[case] log: &str) {
    let image = if log == CAA_LOG { "busybox" } else { "nginx" };
    let err = image_pull_time(log, image).unwrap_err().downcast::<AssessError>().unwrap();
    assert!(matches!(err, AssessError::ImagePullNotFound(..)));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_watch_image_pull_time_pod_not_running(mut test_pod: corev1::Pod, test_caa_pod: corev1::Pod) {
    let (_, client) = make_fake_apiserver();
    test_pod.status = Some(corev1::PodStatus { phase: Some(POD_PENDING.into()), ..Default::default() });

    let err = watch_image_pull_time(client, &test_caa_pod, &test_pod)
        .await
        .unwrap_err()
        .downcast::<AssessError>()
        .unwrap();
    assert!(matches!(err, AssessError::PodNotRunning(..)));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_watch_image_pull_time(test_pod: corev1::Pod, test_caa_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle(|when, then| {
            when.method(GET).path(format!("{}/log", pod_path(CAA_NAMESPACE, TEST_CAA_POD)));
            then.body(CAA_LOG);
        })
        .build();

    let elapsed = watch_image_pull_time(client, &test_caa_pod, &test_pod).await.unwrap();
    assert_eq!(elapsed, "30s");
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_watch_image_pull_time_empty_log(test_pod: corev1::Pod, test_caa_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle(|when, then| {
            when.method(GET).path(format!("{}/log", pod_path(CAA_NAMESPACE, TEST_CAA_POD)));
            then.body("");
        })
        .build();

    let err = watch_image_pull_time(client, &test_caa_pod, &test_pod)
        .await
        .unwrap_err()
        .downcast::<AssessError>()
        .unwrap();
    assert!(matches!(err, AssessError::EmptyLog(..)));
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_find_caa_pod_prefers_same_node(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    let caa_pods = json!([
        test_caa_pod("caa-other-node", "worker-1"),
        test_caa_pod("caa-same-node", TEST_NODE),
    ]);
    fake_apiserver
        .handle(move |when, then| {
            when.method(GET)
                .path(pods_path(CAA_NAMESPACE))
                .query_param("labelSelector", CAA_POD_LABEL_SELECTOR);
            then.json_body(list_of("PodList", caa_pods.clone()));
        })
        .build();

    let caa_pod = find_caa_pod(client, &test_pod).await.unwrap();
    assert_eq!(caa_pod.name_any(), "caa-same-node");
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_find_caa_pod_none() {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver.handle_list(pods_path(CAA_NAMESPACE), "PodList", json!([])).build();

    let err = find_caa_pod(client, &test_pod(TEST_POD)).await.unwrap_err().downcast::<AssessError>().unwrap();
    assert!(matches!(err, AssessError::CaaPodNotFound(..)));
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_check_pod_logs(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    let pods = json!([test_pod.clone()]);
    fake_apiserver
        .handle_list(pods_path(TEST_NAMESPACE), "PodList", pods)
        .handle(|when, then| {
            when.method(GET).path(format!("{}/log", pod_path(TEST_NAMESPACE, TEST_POD)));
            then.body("  3.14159\n");
        })
        .build();

    let (log, res) = check_pod_logs(client.clone(), &test_pod, "3.14159").await;
    assert_eq!(log, "3.14159");
    assert_ok!(res);

    let (log, res) = check_pod_logs(client, &test_pod, "2.71828").await;
    assert_eq!(log, "3.14159");
    assert!(matches!(res.unwrap_err().downcast::<AssessError>().unwrap(), AssessError::UnexpectedLog(..)));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_check_pod_logs_pod_missing(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver.handle_list(pods_path(TEST_NAMESPACE), "PodList", json!([])).build();

    let (log, res) = check_pod_logs(client, &test_pod, "anything").await;
    assert_is_empty!(log);
    assert_err!(res);
    fake_apiserver.assert();
}
