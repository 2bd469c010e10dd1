use std::sync::atomic::{
    AtomicBool,
    Ordering,
};

use httpmock::Method::*;
use httpmock::prelude::HttpMockRequest;
use mockall::Sequence;
use pp_core::cloud::CloudAssertError;
use serde_json::json;

use super::*;
use crate::test_case::TestCase;

const TEST_SECRET: &str = "test-secret";

// The namespace already exists, the pod gets created and is immediately in `pod`'s phase, and
// teardown deletes it again
fn handle_pod_lifecycle(fake_apiserver: &mut MockServerBuilder, pod: corev1::Pod) {
    let created = pod.clone();
    fake_apiserver
        .handle_existing_namespace(TEST_NAMESPACE)
        .handle(move |when, then| {
            when.method(POST).path(pods_path(TEST_NAMESPACE));
            then.json_body(json!(created));
        })
        .handle(move |when, then| {
            when.method(GET).path(pod_path(TEST_NAMESPACE, TEST_POD));
            then.json_body(json!(pod));
        })
        .handle(|when, then| {
            when.method(DELETE).path(pod_path(TEST_NAMESPACE, TEST_POD));
            then.json_body(status_ok());
        });
}

fn server_error(message: &str) -> serde_json::Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": "InternalError",
        "code": 500
    })
}

fn cloud_with_pod_vm(instance_type: &'static str) -> MockCloudAssert {
    let mut cloud = MockCloudAssert::new();
    cloud.expect_has_pod_vm().withf(|name| name == TEST_POD).times(1).returning(|_| Ok(()));
    cloud
        .expect_get_instance_type()
        .withf(|name| name == TEST_POD)
        .returning(move |_| Ok(instance_type.into()));
    cloud
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_simple_pod_passes(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    handle_pod_lifecycle(&mut fake_apiserver, test_pod.clone());
    fake_apiserver.build();

    let tc = TestCase::new("SimplePeerPod", Arc::new(cloud_with_pod_vm("bx2-2x8")), "PodVM is created").with_pod(test_pod);
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    assert_eq!(res.outcome, Outcome::Passed);
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_instance_type_mismatch(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    handle_pod_lifecycle(&mut fake_apiserver, test_pod.clone());
    fake_apiserver.build();

    let tc = TestCase::new("PodVMwithNoAnnotations", Arc::new(cloud_with_pod_vm("cx2-2x4")), "PodVM is created")
        .with_pod(test_pod)
        .with_expected_instance_type("bx2-2x8");
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    assert_eq!(
        res.outcome,
        Outcome::Failed(vec!["PodVM instance type: unexpected instance type: expected bx2-2x8, got cx2-2x4".into()])
    );
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_completed_pod_does_not_check_pod_vm(mut test_pod: corev1::Pod) {
    test_pod.status = Some(corev1::PodStatus { phase: Some(POD_SUCCEEDED.into()), ..Default::default() });
    let (mut fake_apiserver, client) = make_fake_apiserver();
    handle_pod_lifecycle(&mut fake_apiserver, test_pod.clone());
    fake_apiserver.build();

    // no expectations: any call to the cloud fails the test
    let tc = TestCase::new("UserPeerPod", Arc::new(MockCloudAssert::new()), "PodVM is created")
        .with_pod(test_pod)
        .with_pod_state(POD_SUCCEEDED);
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    assert_eq!(res.outcome, Outcome::Passed);
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_setup_failure_still_tears_down(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle_existing_namespace(TEST_NAMESPACE)
        .handle(|when, then| {
            when.method(POST).path(pods_path(TEST_NAMESPACE));
            then.status(500).json_body(server_error("etcd is having a bad day"));
        })
        .handle(|when, then| {
            when.method(DELETE).path(pod_path(TEST_NAMESPACE, TEST_POD));
            then.status(404).json_body(status_not_found());
        })
        .build();

    let tc = TestCase::new("SimplePeerPod", Arc::new(MockCloudAssert::new()), "PodVM is created").with_pod(test_pod);
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    let Outcome::Failed(msgs) = &res.outcome else { panic!("expected failure, got {:?}", res.outcome) };
    assert_len_eq_x!(msgs, 1);
    assert!(msgs[0].starts_with("create test objects"));
    fake_apiserver.assert();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_no_objects() {
    let (_, client) = make_fake_apiserver();
    let tc = TestCase::new("Empty", Arc::new(MockCloudAssert::new()), "nothing");
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    let Outcome::Failed(msgs) = &res.outcome else { panic!("expected failure, got {:?}", res.outcome) };
    assert_eq!(msgs, &vec!["create test objects: test case has nothing to create a namespace for: Empty".to_string()]);
}

// The pod is served as running until the DELETE comes through, and as gone afterwards
static DELETE_TEST_POD_GONE: AtomicBool = AtomicBool::new(false);

fn delete_test_pod(req: &HttpMockRequest) -> bool {
    let is_delete = req.method_str() == "DELETE" && req.uri().path() == pod_path(TEST_NAMESPACE, TEST_POD);
    if is_delete {
        DELETE_TEST_POD_GONE.store(true, Ordering::SeqCst);
    }
    is_delete
}

fn test_pod_exists(_: &HttpMockRequest) -> bool {
    !DELETE_TEST_POD_GONE.load(Ordering::SeqCst)
}

fn test_pod_gone(_: &HttpMockRequest) -> bool {
    DELETE_TEST_POD_GONE.load(Ordering::SeqCst)
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_delete_assertion_waits_for_pod_vm(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    let created = test_pod.clone();
    let running = test_pod.clone();
    fake_apiserver
        .handle_existing_namespace(TEST_NAMESPACE)
        .handle(move |when, then| {
            when.method(POST).path(pods_path(TEST_NAMESPACE));
            then.json_body(json!(created));
        })
        .handle(|when, then| {
            when.matches(delete_test_pod);
            then.json_body(status_ok());
        })
        .handle(move |when, then| {
            when.method(GET).path(pod_path(TEST_NAMESPACE, TEST_POD)).matches(test_pod_exists);
            then.json_body(json!(running));
        })
        .handle(|when, then| {
            when.method(GET).path(pod_path(TEST_NAMESPACE, TEST_POD)).matches(test_pod_gone);
            then.status(404).json_body(status_not_found());
        })
        .build();

    // once for the creation check, once more while the PodVM is still shutting down
    let mut seq = Sequence::new();
    let mut cloud = MockCloudAssert::new();
    cloud
        .expect_has_pod_vm()
        .withf(|name| name == TEST_POD)
        .times(2)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    cloud
        .expect_has_pod_vm()
        .withf(|name| name == TEST_POD)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(CloudAssertError::pod_vm_not_found(TEST_POD)));

    let tc = TestCase::new("DeletePod", Arc::new(cloud), "PodVM is created")
        .with_pod(test_pod)
        .with_delete_assertion();
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    assert_eq!(res.outcome, Outcome::Passed);
    assert!(DELETE_TEST_POD_GONE.load(Ordering::SeqCst));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_teardown_reports_every_failure(test_pod: corev1::Pod) {
    let secret = corev1::Secret {
        metadata: metav1::ObjectMeta {
            name: Some(TEST_SECRET.into()),
            namespace: Some(TEST_NAMESPACE.into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let created = secret.clone();
    let secret_path = format!("/api/v1/namespaces/{TEST_NAMESPACE}/secrets");

    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver
        .handle_existing_namespace(TEST_NAMESPACE)
        .handle({
            let path = secret_path.clone();
            move |when, then| {
                when.method(POST).path(&path);
                then.json_body(json!(created));
            }
        })
        .handle(|when, then| {
            when.method(POST).path(pods_path(TEST_NAMESPACE));
            then.status(500).json_body(server_error("etcd is having a bad day"));
        })
        .handle(|when, then| {
            when.method(DELETE).path(pod_path(TEST_NAMESPACE, TEST_POD));
            then.status(500).json_body(server_error("pod is stuck"));
        })
        .handle(move |when, then| {
            when.method(DELETE).path(format!("{secret_path}/{TEST_SECRET}"));
            then.status(500).json_body(server_error("secret is stuck"));
        })
        .build();

    let tc = TestCase::new("SecretPeerPod", Arc::new(MockCloudAssert::new()), "PodVM is created")
        .with_pod(test_pod)
        .with_secret(secret);
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    let Outcome::Failed(msgs) = &res.outcome else { panic!("expected failure, got {:?}", res.outcome) };
    assert_len_eq_x!(msgs, 2);
    assert!(msgs[0].starts_with("create test objects"));
    assert!(msgs[1].starts_with("teardown"));
    assert!(msgs[1].contains("pod is stuck"));
    assert!(msgs[1].contains("secret is stuck"));
    fake_apiserver.assert();
}

fn handle_auth_events(fake_apiserver: &mut MockServerBuilder, message: &'static str) {
    let events = json!([
        {
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": {"name": "test-pod.1", "namespace": TEST_NAMESPACE},
            "involvedObject": {"kind": "Pod", "name": TEST_POD, "namespace": TEST_NAMESPACE},
            "type": EVENT_TYPE_WARNING,
            "reason": "Failed",
            "message": message,
        },
    ]);
    fake_apiserver.handle(move |when, then| {
        when.method(GET)
            .path(events_path(TEST_NAMESPACE))
            .query_param("fieldSelector", format!("involvedObject.name={TEST_POD}"));
        then.json_body(list_of("EventList", events.clone()));
    });
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_auth_image_rejected_as_expected(mut test_pod: corev1::Pod) {
    test_pod.status = Some(corev1::PodStatus { phase: Some(POD_PENDING.into()), ..Default::default() });
    let (mut fake_apiserver, client) = make_fake_apiserver();
    handle_pod_lifecycle(&mut fake_apiserver, test_pod.clone());
    handle_auth_events(&mut fake_apiserver, "failed to authorize: 401 UNAUTHORIZED");
    fake_apiserver.build();

    // a rejected pull never gets a PodVM, so the cloud isn't consulted
    let tc = TestCase::new("InvalidAuthImagePeerPod", Arc::new(MockCloudAssert::new()), "PodVM is created")
        .with_pod(test_pod)
        .with_auth_image_status(AUTH_STATUS_FAILED)
        .with_pod_state(POD_PENDING);
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    assert_eq!(res.outcome, Outcome::Passed);
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_auth_image_unexpectedly_rejected(test_pod: corev1::Pod) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    handle_pod_lifecycle(&mut fake_apiserver, test_pod.clone());
    handle_auth_events(&mut fake_apiserver, "failed to authorize: 401 UNAUTHORIZED");
    fake_apiserver.build();

    let tc = TestCase::new("ValidAuthImagePeerPod", Arc::new(cloud_with_pod_vm("bx2-2x8")), "PodVM is created")
        .with_pod(test_pod)
        .with_auth_image_status(AUTH_STATUS_COMPLETED);
    let mut env = TestEnv::new(client);
    let res = env.test(tc.into_feature()).await;

    let Outcome::Failed(msgs) = &res.outcome else { panic!("expected failure, got {:?}", res.outcome) };
    assert_len_eq_x!(msgs, 1);
    assert!(msgs[0].starts_with("authenticated image status"));
    assert!(msgs[0].contains("401 UNAUTHORIZED"));
}
