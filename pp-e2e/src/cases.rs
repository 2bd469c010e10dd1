//! Provider-independent test cases.  Each one builds the objects it needs and the checks to run
//! against them; the provider registry decides which cases run and with which cloud assertions.
use std::collections::BTreeMap;
use std::sync::Arc;

use pp_core::k8s::*;
use pp_core::kmap;
use pp_core::prelude::*;
use serde_json::json;

use crate::test_case::{
    TestCase,
    TestCommand,
};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const RESTART_POLICY_ON_FAILURE: &str = "OnFailure";
pub const DOCKER_CONFIG_JSON_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
pub const AUTH_JSON_SECRET_NAME: &str = "auth-json-secret";
// base64 of invalid:invalid
pub const INVALID_REGISTRY_CREDENTIAL: &str = "aW52YWxpZDppbnZhbGlk";
pub const SANDBOX_CREATE_FAILED_MESSAGE: &str = "Failed to create pod sandbox";

const DEFAULT_REGISTRY: &str = "docker.io";
const SLEEP_COMMAND: &[&str] = &["/bin/sh", "-c", "sleep 3600"];
const ENV_COMMAND: &[&str] = &["/bin/sh", "-c", "env"];

type Assert = Arc<dyn CloudAssert>;

fn test_image(tag: &str) -> String {
    format!("{TEST_IMAGES_REPO}:{tag}")
}

pub fn create_simple_pod(assert: Assert) -> TestCase {
    let pod = new_nginx_pod_with_name(DEFAULT_NAMESPACE, "simple-test");
    TestCase::new("SimplePeerPod", assert, "PodVM is created").with_pod(pod)
}

pub fn create_confidential_pod(assert: Assert, commands: Vec<TestCommand>) -> TestCase {
    let pod = new_nginx_pod_with_name(DEFAULT_NAMESPACE, "confidential-pod-nginx");
    TestCase::new("ConfidentialPodVM", assert, "Confidential PodVM is created")
        .with_pod(pod)
        .with_test_commands(commands)
}

pub fn create_pod_with_config_map(assert: Assert) -> TestCase {
    let cm_name = "busybox-configmap";
    let cm_dir = "/etc/config/";
    let file_name = "example.txt";
    let contents = "Hello, world";

    let cm = new_config_map(DEFAULT_NAMESPACE, cm_name, kmap!(file_name => contents));
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "busybox-configmap-pod",
        "busybox-configmap-container",
        BUSYBOX_IMAGE,
        vec![with_command(SLEEP_COMMAND), with_config_map_binding(cm_dir, cm_name)],
    );
    let cmd = TestCommand::new(&["cat", &format!("{cm_dir}{file_name}")]).check_stdout(move |out| out.trim() == contents);

    TestCase::new("ConfigMapPeerPod", assert, "Configmap is created and contains data")
        .with_pod(pod)
        .with_config_map(cm)
        .with_test_commands(vec![cmd])
}

pub fn create_pod_with_secret(assert: Assert) -> TestCase {
    let secret_name = "busybox-secret";
    let secret_dir = "/etc/secret/";
    let (username, password) = ("admin", "password");

    let data = BTreeMap::from([
        ("username".to_string(), username.as_bytes().to_vec()),
        ("password".to_string(), password.as_bytes().to_vec()),
    ]);
    let secret = new_secret(DEFAULT_NAMESPACE, secret_name, data, "Opaque");
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "busybox-secret-pod",
        "busybox-secret-container",
        BUSYBOX_IMAGE,
        vec![with_command(SLEEP_COMMAND), with_secret_binding(secret_dir, secret_name)],
    );
    let commands = vec![
        TestCommand::new(&["cat", &format!("{secret_dir}username")]).check_stdout(move |out| out.trim() == username),
        TestCommand::new(&["cat", &format!("{secret_dir}password")]).check_stdout(move |out| out.trim() == password),
    ];

    TestCase::new("SecretPeerPod", assert, "Secret has been created and contains data")
        .with_pod(pod)
        .with_secret(secret)
        .with_test_commands(commands)
}

pub fn create_pod_with_external_ip_access(assert: Assert) -> TestCase {
    let pod = new_busybox_pod(DEFAULT_NAMESPACE);
    let cmd = TestCommand::new(&["ping", "-c", "1", "www.google.com"])
        .check_stdout(|out| out.contains("1 packets received"));

    TestCase::new("IPAccessPeerPod", assert, "Peer Pod Container Connected to External IP")
        .with_pod(pod)
        .with_test_commands(vec![cmd])
}

pub fn create_peer_pod_with_job(assert: Assert) -> TestCase {
    let job = new_job(DEFAULT_NAMESPACE, "job-pi");
    TestCase::new("JobPeerPod", assert, "Job has been created")
        .with_job(job)
        .with_expected_pod_logs("3.14")
}

// These images finish on their own, so the interesting phase is Succeeded rather than Running
fn completed_log_case(name: &str, assert: Assert, pod: corev1::Pod, expected: &str) -> TestCase {
    TestCase::new(name, assert, "Peer pod with expected logs has been created")
        .with_pod(pod)
        .with_expected_pod_logs(expected)
        .with_pod_state(POD_SUCCEEDED)
}

pub fn create_peer_pod_and_check_user_logs(assert: Assert) -> TestCase {
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "user-pod",
        "user-pod",
        &test_image("testuser"),
        vec![with_restart_policy(RESTART_POLICY_ON_FAILURE)],
    );
    completed_log_case("UserPeerPod", assert, pod, "otheruser").with_skip_on_ci()
}

pub fn create_peer_pod_and_check_work_dir_logs(assert: Assert) -> TestCase {
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "workdirpod",
        "workdirpod",
        &test_image("testworkdir"),
        vec![with_restart_policy(RESTART_POLICY_ON_FAILURE)],
    );
    completed_log_case("WorkDirPeerPod", assert, pod, "/other").with_skip_on_ci()
}

pub fn create_peer_pod_and_check_env_variable_logs_with_image_only(assert: Assert) -> TestCase {
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "env-variable-in-image",
        "env-variable-in-image",
        &test_image("testenv"),
        vec![with_restart_policy(RESTART_POLICY_ON_FAILURE)],
    );
    completed_log_case("EnvVariablePeerPodWithImageOnly", assert, pod, "ISPRODUCTION=false")
}

pub fn create_peer_pod_and_check_env_variable_logs_with_deployment_only(assert: Assert) -> TestCase {
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "env-variable-in-config",
        "env-variable-in-config",
        BUSYBOX_IMAGE,
        vec![
            with_restart_policy(RESTART_POLICY_ON_FAILURE),
            with_env(vec![env_var("ISPRODUCTION", "true")]),
            with_command(ENV_COMMAND),
        ],
    );
    completed_log_case("EnvVariablePeerPodWithDeploymentOnly", assert, pod, "ISPRODUCTION=true")
}

// The pod spec wins over the image when both set the same variable
pub fn create_peer_pod_and_check_env_variable_logs_with_image_and_deployment(assert: Assert) -> TestCase {
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "env-variable-in-both",
        "env-variable-in-both",
        &test_image("testenv"),
        vec![
            with_restart_policy(RESTART_POLICY_ON_FAILURE),
            with_env(vec![env_var("ISPRODUCTION", "true")]),
            with_command(ENV_COMMAND),
        ],
    );
    completed_log_case("EnvVariablePeerPodWithBoth", assert, pod, "ISPRODUCTION=true")
}

pub fn create_peer_pod_with_large_image(assert: Assert) -> TestCase {
    let pod = new_pod(
        DEFAULT_NAMESPACE,
        "largeimage-pod",
        "largeimage-pod",
        &test_image("largeimage"),
        vec![with_restart_policy(RESTART_POLICY_NEVER)],
    );
    TestCase::new("LargeImagePeerPod", assert, "Peer pod with Large Image has been created")
        .with_pod(pod)
        .with_image_pull_timer()
}

pub fn create_peer_pod_with_pvc_and_csi_wrapper(
    assert: Assert,
    pvc: corev1::PersistentVolumeClaim,
    pod: corev1::Pod,
    mount_path: &str,
) -> TestCase {
    let workload = pod.spec.as_ref().and_then(|s| s.containers.last()).map(|c| c.name.clone());
    let mount_path = mount_path.to_string();
    let mut cmd = TestCommand::new(&["lsblk"]).check_stdout(move |out| out.contains(&mount_path));
    if let Some(name) = workload {
        cmd = cmd.in_container(&name);
    }

    TestCase::new("PeerPodWithPVCAndCSIWrapper", assert, "PVC is created and mounted as expected")
        .with_pod(pod)
        .with_pvc(pvc)
        .with_test_commands(vec![cmd])
}

// The registry host is the first path component of the image name, if it looks like a host
pub fn registry_of(image: &str) -> &str {
    match image.split_once('/') {
        Some((host, _)) if host.contains('.') || host.contains(':') || host == "localhost" => host,
        _ => DEFAULT_REGISTRY,
    }
}

pub fn new_auth_json_secret(namespace: &str, image: &str, credential: &str) -> corev1::Secret {
    let auth_json = json!({"auths": {registry_of(image): {"auth": credential}}});
    let data = BTreeMap::from([(DOCKER_CONFIG_JSON_KEY.to_string(), auth_json.to_string().into_bytes())]);
    new_secret(namespace, AUTH_JSON_SECRET_NAME, data, DOCKER_CONFIG_JSON_SECRET_TYPE)
}

fn authenticated_image_case(name: &str, assert: Assert, pod_name: &str, image: &str, credential: Option<&str>) -> TestCase {
    let mut options = vec![with_restart_policy(RESTART_POLICY_NEVER)];
    if credential.is_some() {
        options.push(with_image_pull_secrets(AUTH_JSON_SECRET_NAME));
    }
    let pod = new_pod(DEFAULT_NAMESPACE, pod_name, pod_name, image, options);

    let tc = TestCase::new(name, assert, "Peer pod with authenticated image has been created").with_pod(pod);
    match credential {
        Some(cred) => tc.with_secret(new_auth_json_secret(DEFAULT_NAMESPACE, image, cred)),
        None => tc,
    }
}

pub fn create_peer_pod_with_authenticated_image_with_valid_credentials(
    assert: Assert,
    image: &str,
    credential: &str,
) -> TestCase {
    authenticated_image_case("ValidAuthImagePeerPod", assert, "authenticated-image-valid", image, Some(credential))
        .with_auth_image_status(AUTH_STATUS_COMPLETED)
}

pub fn create_peer_pod_with_authenticated_image_with_invalid_credentials(assert: Assert, image: &str) -> TestCase {
    authenticated_image_case(
        "InvalidAuthImagePeerPod",
        assert,
        "authenticated-image-invalid",
        image,
        Some(INVALID_REGISTRY_CREDENTIAL),
    )
    .with_auth_image_status(AUTH_STATUS_FAILED)
    .with_pod_state(POD_PENDING)
}

pub fn create_peer_pod_with_authenticated_image_without_credentials(assert: Assert, image: &str) -> TestCase {
    authenticated_image_case("InvalidNoAuthImagePeerPod", assert, "authenticated-image-without-creds", image, None)
        .with_auth_image_status(AUTH_STATUS_FAILED)
        .with_pod_state(POD_PENDING)
}

pub fn delete_simple_pod(assert: Assert) -> TestCase {
    let pod = new_nginx_pod_with_name(DEFAULT_NAMESPACE, "deletion-test");
    TestCase::new("DeletePod", assert, "Deletion complete")
        .with_pod(pod)
        .with_delete_assertion()
}

fn annotated_pod(name: &str, annotations: BTreeMap<String, String>) -> corev1::Pod {
    new_pod(
        DEFAULT_NAMESPACE,
        name,
        "busybox",
        BUSYBOX_IMAGE,
        vec![with_command(SLEEP_COMMAND), with_annotations(annotations)],
    )
}

pub fn pod_vm_with_no_annotations(assert: Assert, expected_type: &str) -> TestCase {
    let pod = new_pod(DEFAULT_NAMESPACE, "no-annotations", "busybox", BUSYBOX_IMAGE, vec![with_command(SLEEP_COMMAND)]);
    TestCase::new("PodVMwithNoAnnotations", assert, "PodVM with no annotations is created")
        .with_pod(pod)
        .with_expected_instance_type(expected_type)
}

pub fn pod_vm_with_annotations_instance_type(assert: Assert, expected_type: &str) -> TestCase {
    let pod = annotated_pod("annotations-instance-type", kmap!(MACHINE_TYPE_ANNOTATION_KEY => expected_type));
    TestCase::new("PodVMwithAnnotationsInstanceType", assert, "PodVM with an instance type annotation is created")
        .with_pod(pod)
        .with_expected_instance_type(expected_type)
}

pub fn pod_vm_with_annotations_cpu_memory(assert: Assert, expected_type: &str) -> TestCase {
    let pod = annotated_pod(
        "annotations-cpu-mem",
        kmap!(DEFAULT_VCPUS_ANNOTATION_KEY => "2", DEFAULT_MEMORY_ANNOTATION_KEY => "12288"),
    );
    TestCase::new("PodVMwithAnnotationsCPUMemory", assert, "PodVM with CPU and memory annotations is created")
        .with_pod(pod)
        .with_expected_instance_type(expected_type)
}

// The remaining annotation cases ask for something the provider won't hand out, so the pod
// never gets a PodVM and the sandbox creation failure shows up as a warning event
pub fn pod_vm_with_annotations_invalid_instance_type(assert: Assert, instance_type: &str) -> TestCase {
    let pod = annotated_pod("annotations-invalid-instance-type", kmap!(MACHINE_TYPE_ANNOTATION_KEY => instance_type));
    TestCase::new("PodVMwithAnnotationsInvalidInstanceType", assert, "Failed to create PodVM with invalid instance type")
        .with_pod(pod)
        .with_expected_pod_event_error(SANDBOX_CREATE_FAILED_MESSAGE)
}

pub fn pod_vm_with_annotations_larger_memory(assert: Assert) -> TestCase {
    let pod = annotated_pod(
        "annotations-too-big-mem",
        kmap!(DEFAULT_VCPUS_ANNOTATION_KEY => "2", DEFAULT_MEMORY_ANNOTATION_KEY => "18432"),
    );
    TestCase::new("PodVMwithAnnotationsLargerMemory", assert, "Failed to create PodVM with too much memory")
        .with_pod(pod)
        .with_expected_pod_event_error(SANDBOX_CREATE_FAILED_MESSAGE)
}

pub fn pod_vm_with_annotations_larger_cpu(assert: Assert) -> TestCase {
    let pod = annotated_pod(
        "annotations-too-big-cpu",
        kmap!(DEFAULT_VCPUS_ANNOTATION_KEY => "3", DEFAULT_MEMORY_ANNOTATION_KEY => "12288"),
    );
    TestCase::new("PodVMwithAnnotationsLargerCPU", assert, "Failed to create PodVM with too many CPUs")
        .with_pod(pod)
        .with_expected_pod_event_error(SANDBOX_CREATE_FAILED_MESSAGE)
}
