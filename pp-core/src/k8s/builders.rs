use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::*;
use crate::kmap;

const CONFIG_VOLUME_NAME: &str = "config-volume";
const SECRET_VOLUME_NAME: &str = "secret-volume";
const PVC_VOLUME_NAME: &str = "pvc-volume";
const MOUNT_PROPAGATION_HOST_TO_CONTAINER: &str = "HostToContainer";
const MOUNT_PROPAGATION_BIDIRECTIONAL: &str = "Bidirectional";
const HOST_PATH_DIRECTORY: &str = "Directory";

const JOB_BACKOFF_LIMIT: i32 = 8;
const JOB_PI_COMMAND: &str = "echo 'scale=5; 4*a(1)' | bc -l";

const IBM_VPC_BLOCK_NODE_SERVICE_ACCOUNT: &str = "ibm-vpc-block-node-sa";
const IBM_VPC_BLOCK_CSI_CONFIGMAP: &str = "ibm-vpc-block-csi-configmap";
const IBM_STORAGE_SECRET_STORE: &str = "storage-secret-store";

// Options are applied in order to a freshly built pod; anything that touches "the container"
// means the first one, except for PVC bindings, which go to the workload container at the end
// of the list (multi-container CSI pods put the workload last).
#[derive(Clone, Debug)]
pub enum PodOption {
    RestartPolicy(String),
    ContainerPort(i32),
    Command(Vec<String>),
    Env(Vec<corev1::EnvVar>),
    ImagePullSecrets(String),
    ConfigMapBinding { mount_path: String, config_map_name: String },
    SecretBinding { mount_path: String, secret_name: String },
    PvcBinding { mount_path: String, pvc_name: String },
    Annotations(BTreeMap<String, String>),
}

pub fn with_restart_policy(policy: &str) -> PodOption {
    PodOption::RestartPolicy(policy.into())
}

pub fn with_container_port(port: i32) -> PodOption {
    PodOption::ContainerPort(port)
}

pub fn with_command(command: &[&str]) -> PodOption {
    PodOption::Command(command.iter().map(|s| s.to_string()).collect())
}

pub fn with_env(vars: Vec<corev1::EnvVar>) -> PodOption {
    PodOption::Env(vars)
}

pub fn with_image_pull_secrets(secret_name: &str) -> PodOption {
    PodOption::ImagePullSecrets(secret_name.into())
}

pub fn with_config_map_binding(mount_path: &str, config_map_name: &str) -> PodOption {
    PodOption::ConfigMapBinding {
        mount_path: mount_path.into(),
        config_map_name: config_map_name.into(),
    }
}

pub fn with_secret_binding(mount_path: &str, secret_name: &str) -> PodOption {
    PodOption::SecretBinding { mount_path: mount_path.into(), secret_name: secret_name.into() }
}

pub fn with_pvc_binding(mount_path: &str, pvc_name: &str) -> PodOption {
    PodOption::PvcBinding { mount_path: mount_path.into(), pvc_name: pvc_name.into() }
}

pub fn with_annotations(annotations: BTreeMap<String, String>) -> PodOption {
    PodOption::Annotations(annotations)
}

impl PodOption {
    pub fn apply(self, pod: &mut corev1::Pod) {
        let spec = pod.spec.get_or_insert_with(Default::default);
        match self {
            PodOption::RestartPolicy(policy) => spec.restart_policy = Some(policy),
            PodOption::ContainerPort(port) => {
                if let Some(c) = spec.containers.first_mut() {
                    c.ports = Some(vec![corev1::ContainerPort { container_port: port, ..Default::default() }]);
                    c.readiness_probe = Some(http_readiness_probe(port));
                }
            },
            PodOption::Command(command) => {
                if let Some(c) = spec.containers.first_mut() {
                    c.command = Some(command);
                }
            },
            PodOption::Env(vars) => {
                if let Some(c) = spec.containers.first_mut() {
                    c.env = Some(vars);
                }
            },
            PodOption::ImagePullSecrets(secret_name) => {
                spec.image_pull_secrets = Some(vec![corev1::LocalObjectReference { name: secret_name.into() }]);
            },
            PodOption::ConfigMapBinding { mount_path, config_map_name } => {
                if let Some(c) = spec.containers.first_mut() {
                    push_volume_mount(c, CONFIG_VOLUME_NAME, &mount_path, None);
                }
                spec.volumes.get_or_insert_with(Vec::new).push(corev1::Volume {
                    name: CONFIG_VOLUME_NAME.into(),
                    config_map: Some(corev1::ConfigMapVolumeSource {
                        name: config_map_name.into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
            },
            PodOption::SecretBinding { mount_path, secret_name } => {
                if let Some(c) = spec.containers.first_mut() {
                    push_volume_mount(c, SECRET_VOLUME_NAME, &mount_path, None);
                }
                spec.volumes.get_or_insert_with(Vec::new).push(corev1::Volume {
                    name: SECRET_VOLUME_NAME.into(),
                    secret: Some(corev1::SecretVolumeSource { secret_name: Some(secret_name), ..Default::default() }),
                    ..Default::default()
                });
            },
            PodOption::PvcBinding { mount_path, pvc_name } => {
                if let Some(c) = spec.containers.last_mut() {
                    push_volume_mount(c, PVC_VOLUME_NAME, &mount_path, Some(MOUNT_PROPAGATION_HOST_TO_CONTAINER));
                }
                spec.volumes.get_or_insert_with(Vec::new).push(corev1::Volume {
                    name: PVC_VOLUME_NAME.into(),
                    persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
                        claim_name: pvc_name,
                        ..Default::default()
                    }),
                    ..Default::default()
                });
            },
            PodOption::Annotations(annotations) => pod.metadata.annotations = Some(annotations),
        }
    }
}

fn push_volume_mount(container: &mut corev1::Container, name: &str, mount_path: &str, propagation: Option<&str>) {
    container.volume_mounts.get_or_insert_with(Vec::new).push(corev1::VolumeMount {
        name: name.into(),
        mount_path: mount_path.into(),
        mount_propagation: propagation.map(String::from),
        ..Default::default()
    });
}

fn http_readiness_probe(port: i32) -> corev1::Probe {
    corev1::Probe {
        http_get: Some(corev1::HTTPGetAction {
            path: Some("/".into()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(10),
        period_seconds: Some(5),
        ..Default::default()
    }
}

fn object_meta(namespace: &str, name: &str) -> metav1::ObjectMeta {
    metav1::ObjectMeta {
        name: Some(name.into()),
        namespace: Some(namespace.into()),
        ..Default::default()
    }
}

fn field_ref_env(name: &str, field_path: &str) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.into(),
        value_from: Some(corev1::EnvVarSource {
            field_ref: Some(corev1::ObjectFieldSelector { field_path: field_path.into(), ..Default::default() }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn env_var(name: &str, value: &str) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub fn new_pod(
    namespace: &str,
    pod_name: &str,
    container_name: &str,
    image: &str,
    options: Vec<PodOption>,
) -> corev1::Pod {
    let mut pod = corev1::Pod {
        metadata: object_meta(namespace, pod_name),
        spec: Some(corev1::PodSpec {
            containers: vec![corev1::Container {
                name: container_name.into(),
                image: Some(image.into()),
                image_pull_policy: Some(PULL_ALWAYS.into()),
                ..Default::default()
            }],
            runtime_class_name: Some(PEER_POD_RUNTIME_CLASS.into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    for option in options {
        option.apply(&mut pod);
    }

    pod
}

pub fn new_nginx_pod(namespace: &str) -> corev1::Pod {
    new_nginx_pod_with_name(namespace, "nginx")
}

pub fn new_nginx_pod_with_name(namespace: &str, pod_name: &str) -> corev1::Pod {
    new_pod(namespace, pod_name, "nginx", NGINX_IMAGE, vec![with_restart_policy(RESTART_POLICY_NEVER)])
}

pub fn new_busybox_pod(namespace: &str) -> corev1::Pod {
    new_pod(
        namespace,
        "busybox-pod",
        "busybox",
        BUSYBOX_IMAGE,
        vec![with_command(&["/bin/sh", "-c", "sleep 3600"])],
    )
}

pub fn new_config_map(namespace: &str, name: &str, data: BTreeMap<String, String>) -> corev1::ConfigMap {
    corev1::ConfigMap {
        metadata: object_meta(namespace, name),
        data: Some(data),
        ..Default::default()
    }
}

pub fn new_secret(
    namespace: &str,
    name: &str,
    data: BTreeMap<String, Vec<u8>>,
    secret_type: &str,
) -> corev1::Secret {
    corev1::Secret {
        metadata: object_meta(namespace, name),
        data: Some(data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
        type_: Some(secret_type.into()),
        ..Default::default()
    }
}

pub fn new_job(namespace: &str, name: &str) -> batchv1::Job {
    batchv1::Job {
        metadata: object_meta(namespace, name),
        spec: Some(batchv1::JobSpec {
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta { namespace: Some(namespace.into()), ..Default::default() }),
                spec: Some(corev1::PodSpec {
                    termination_grace_period_seconds: Some(0),
                    containers: vec![corev1::Container {
                        name: name.into(),
                        image: Some(BUSYBOX_IMAGE.into()),
                        command: Some(vec!["/bin/sh".into(), "-c".into(), JOB_PI_COMMAND.into()]),
                        ..Default::default()
                    }],
                    restart_policy: Some(RESTART_POLICY_NEVER.into()),
                    runtime_class_name: Some(PEER_POD_RUNTIME_CLASS.into()),
                    ..Default::default()
                }),
            },
            backoff_limit: Some(JOB_BACKOFF_LIMIT),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn new_pvc(
    namespace: &str,
    name: &str,
    storage_class_name: &str,
    disk_size: &str,
    access_mode: &str,
) -> corev1::PersistentVolumeClaim {
    corev1::PersistentVolumeClaim {
        metadata: object_meta(namespace, name),
        spec: Some(corev1::PersistentVolumeClaimSpec {
            storage_class_name: Some(storage_class_name.into()),
            access_modes: Some(vec![access_mode.into()]),
            resources: Some(corev1::VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".into(), Quantity(disk_size.into()))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn host_path_volume(name: &str, path: &str) -> corev1::Volume {
    corev1::Volume {
        name: name.into(),
        host_path: Some(corev1::HostPathVolumeSource {
            path: path.into(),
            type_: Some(HOST_PATH_DIRECTORY.into()),
        }),
        ..Default::default()
    }
}

fn simple_mount(name: &str, mount_path: &str) -> corev1::VolumeMount {
    corev1::VolumeMount {
        name: name.into(),
        mount_path: mount_path.into(),
        ..Default::default()
    }
}

// A peer pod that carries its own CSI node driver and the csi-podvm-wrapper sidecar, so that the
// IBM VPC block volume gets attached inside the pod VM rather than on the worker node
pub fn new_pod_with_pvc_from_ibm_vpc_block_driver(
    namespace: &str,
    pod_name: &str,
    container_name: &str,
    image: &str,
    csi_container_name: &str,
    csi_image: &str,
    options: Vec<PodOption>,
) -> corev1::Pod {
    let csi_driver = corev1::Container {
        name: csi_container_name.into(),
        env: Some(vec![field_ref_env("KUBE_NODE_NAME", "spec.nodeName")]),
        env_from: Some(vec![corev1::EnvFromSource {
            config_map_ref: Some(corev1::ConfigMapEnvSource {
                name: IBM_VPC_BLOCK_CSI_CONFIGMAP.to_string().into(),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        image: Some(csi_image.into()),
        image_pull_policy: Some(PULL_ALWAYS.into()),
        security_context: Some(corev1::SecurityContext {
            privileged: Some(true),
            run_as_non_root: Some(false),
            run_as_user: Some(0),
            ..Default::default()
        }),
        ports: Some(vec![corev1::ContainerPort {
            name: Some("healthz".into()),
            container_port: 9808,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            corev1::VolumeMount {
                name: "kubelet-data-dir".into(),
                mount_path: "/var/lib/kubelet".into(),
                mount_propagation: Some(MOUNT_PROPAGATION_BIDIRECTIONAL.into()),
                ..Default::default()
            },
            simple_mount("plugin-dir", "/tmp"),
            simple_mount("device-dir", "/dev"),
            simple_mount("etcudevpath", "/etc/udev"),
            simple_mount("runudevpath", "/run/udev"),
            simple_mount("libudevpath", "/lib/udev"),
            simple_mount("syspath", "/sys"),
            corev1::VolumeMount {
                name: "customer-auth".into(),
                mount_path: "/etc/storage_ibmc".into(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let csi_wrapper = corev1::Container {
        name: "csi-podvm-wrapper".into(),
        env: Some(vec![
            field_ref_env("POD_NAME", "metadata.name"),
            field_ref_env("POD_NAME_SPACE", "metadata.namespace"),
            field_ref_env("POD_UID", "metadata.uid"),
            field_ref_env("POD_NODE_NAME", "spec.nodeName"),
        ]),
        args: Some(vec![
            "--v=5".into(),
            "--endpoint=/tmp/csi-podvm-wrapper.sock".into(),
            "--target-endpoint=/tmp/csi.sock".into(),
            "--namespace=kube-system".into(),
        ]),
        image: Some(CSI_PODVM_WRAPPER_IMAGE.into()),
        image_pull_policy: Some(PULL_ALWAYS.into()),
        volume_mounts: Some(vec![simple_mount("plugin-dir", "/tmp")]),
        ..Default::default()
    };

    let workload = corev1::Container {
        name: container_name.into(),
        image: Some(image.into()),
        image_pull_policy: Some(PULL_ALWAYS.into()),
        ports: Some(vec![corev1::ContainerPort { container_port: 80, ..Default::default() }]),
        readiness_probe: Some(http_readiness_probe(80)),
        ..Default::default()
    };

    let mut pod = corev1::Pod {
        metadata: object_meta(namespace, pod_name),
        spec: Some(corev1::PodSpec {
            runtime_class_name: Some(PEER_POD_RUNTIME_CLASS.into()),
            containers: vec![csi_driver, csi_wrapper, workload],
            service_account_name: Some(IBM_VPC_BLOCK_NODE_SERVICE_ACCOUNT.into()),
            volumes: Some(vec![
                host_path_volume("kubelet-data-dir", "/var/lib/kubelet"),
                corev1::Volume {
                    name: "plugin-dir".into(),
                    empty_dir: Some(Default::default()),
                    ..Default::default()
                },
                host_path_volume("device-dir", "/dev"),
                host_path_volume("etcudevpath", "/etc/udev"),
                host_path_volume("runudevpath", "/run/udev"),
                host_path_volume("libudevpath", "/lib/udev"),
                host_path_volume("syspath", "/sys"),
                corev1::Volume {
                    name: "customer-auth".into(),
                    secret: Some(corev1::SecretVolumeSource {
                        secret_name: Some(IBM_STORAGE_SECRET_STORE.into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    };

    for option in options {
        option.apply(&mut pod);
    }

    pod
}

// Rolling-update fixtures: an nginx deployment spread across nodes, a NodePort service in front of
// it, and a (non-peer) pod that curls the service in a loop and bails the moment it can't connect.
pub fn new_nginx_deployment(namespace: &str, name: &str, replicas: i32) -> appsv1::Deployment {
    let labels = kmap!("app" => "nginx");
    appsv1::Deployment {
        metadata: metav1::ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(appsv1::DeploymentSpec {
            replicas: Some(replicas),
            selector: metav1::LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta { labels: Some(labels), ..Default::default() }),
                spec: Some(corev1::PodSpec {
                    containers: vec![corev1::Container {
                        name: "nginx".into(),
                        image: Some(NGINX_IMAGE.into()),
                        image_pull_policy: Some(PULL_ALWAYS.into()),
                        ..Default::default()
                    }],
                    runtime_class_name: Some(PEER_POD_RUNTIME_CLASS.into()),
                    affinity: Some(corev1::Affinity {
                        pod_anti_affinity: Some(corev1::PodAntiAffinity {
                            required_during_scheduling_ignored_during_execution: Some(vec![corev1::PodAffinityTerm {
                                label_selector: Some(metav1::LabelSelector {
                                    match_expressions: Some(vec![metav1::LabelSelectorRequirement {
                                        key: "app".into(),
                                        operator: "In".into(),
                                        values: Some(vec!["nginx".into()]),
                                    }]),
                                    ..Default::default()
                                }),
                                topology_key: HOSTNAME_TOPOLOGY_KEY.into(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn new_nginx_service(namespace: &str, name: &str) -> corev1::Service {
    corev1::Service {
        metadata: object_meta(namespace, name),
        spec: Some(corev1::ServiceSpec {
            type_: Some("NodePort".into()),
            ports: Some(vec![corev1::ServicePort {
                name: Some("port80".into()),
                port: 80,
                target_port: Some(IntOrString::Int(80)),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            selector: klabel!("app" => "nginx"),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn verify_connection_script(cluster_ip: &str) -> String {
    format!(
        r#"
while true; do
if ! curl -m 5 -IsSf {cluster_ip}:80 > /dev/null; then
    echo "disconnected: $(date)"
    exit 1
else
    echo "connected: $(date)"
    sleep 1
fi
done
"#
    )
}

pub fn new_verify_pod(namespace: &str, name: &str, cluster_ip: &str) -> corev1::Pod {
    corev1::Pod {
        metadata: object_meta(namespace, name),
        spec: Some(corev1::PodSpec {
            restart_policy: Some(RESTART_POLICY_NEVER.into()),
            containers: vec![corev1::Container {
                name: "verify-container".into(),
                image: Some(CURL_IMAGE.into()),
                command: Some(vec!["/bin/sh".into(), "-c".into(), verify_connection_script(cluster_ip)]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}
