use httpmock::Method::*;
use kube::api::DeleteParams;
use kube::error::ErrorResponse;
use serde_json::json;

use super::*;

#[rstest]
#[case::short_prefix("pp-e2e", 16)]
#[case::default_len("pp-e2e", 0)]
#[case::exact_fit("ab", 4)]
fn test_random_name(#[case] prefix: &str, #[case] n: usize) {
    let name = random_name(prefix, n);
    let expected_len = if n == 0 { 32 } else { n };

    assert_len_eq_x!(&name, expected_len);
    assert!(name.starts_with(&format!("{prefix}-")));
    assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
}

#[rstest]
fn test_random_name_long_prefix() {
    assert_eq!(random_name("default", 7), "default");
    assert_eq!(random_name("default", 3), "default");
}

#[rstest]
fn test_random_name_is_random() {
    assert_ne!(random_name("pp-e2e", 16), random_name("pp-e2e", 16));
}

#[rstest]
#[case::not_found(404, true)]
#[case::server_error(500, false)]
fn test_is_not_found(#[case] code: u16, #[case] expected: bool) {
    let err = kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: "whatever".into(),
        reason: "Stuff".into(),
        code,
    });
    assert_eq!(is_not_found(&err), expected);
}

#[rstest]
#[tokio::test]
async fn test_namespaced_api_missing_namespace() {
    let (_, client) = make_fake_apiserver();
    let mut pod = new_nginx_pod(TEST_NAMESPACE);
    pod.metadata.namespace = None;

    let err = namespaced_api(client, &pod).unwrap_err().downcast::<KubernetesError>().unwrap();
    assert!(matches!(err, KubernetesError::MissingNamespace(..)));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_delete_obj_already_gone(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver.handle_not_found(pod_path(TEST_NAMESPACE, TEST_POD)).build();

    delete_obj(client, &test_pod, &DeleteParams::default()).await.unwrap();
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_delete_obj_error(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle(|when, then| {
            when.method(DELETE).path(pod_path(TEST_NAMESPACE, TEST_POD));
            then.status(500).json_body(json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "reason": "InternalError",
                "code": 500
            }));
        })
        .build();

    let err = delete_obj(client, &test_pod, &DeleteParams::default()).await.unwrap_err();
    assert!(matches!(err.downcast::<kube::Error>().unwrap(), kube::Error::Api(ErrorResponse { code: 500, .. })));
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_ensure_namespace_exists() {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle(|when, then| {
            when.method(GET).path(format!("/api/v1/namespaces/{TEST_NAMESPACE}"));
            then.json_body(json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {"name": TEST_NAMESPACE},
            }));
        })
        .build();

    assert!(!ensure_namespace(client, TEST_NAMESPACE).await.unwrap());
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_ensure_namespace_created() {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle(|when, then| {
            when.method(GET).path(format!("/api/v1/namespaces/{TEST_NAMESPACE}"));
            then.status(404).json_body(status_not_found());
        })
        .handle(|when, then| {
            when.method(POST).path("/api/v1/namespaces");
            then.json_body(json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {"name": TEST_NAMESPACE},
            }));
        })
        .build();

    assert!(ensure_namespace(client, TEST_NAMESPACE).await.unwrap());
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_read_pod_logs_container() {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle(|when, then| {
            when.method(GET)
                .path(format!("{}/log", pod_path(TEST_NAMESPACE, TEST_POD)))
                .query_param("container", "sidecar");
            then.body("hello from the sidecar\n");
        })
        .build();

    let logs = read_pod_logs(client, TEST_NAMESPACE, TEST_POD, Some("sidecar")).await.unwrap();
    assert_eq!(logs, "hello from the sidecar\n");
    fake_apiserver.assert();
}
