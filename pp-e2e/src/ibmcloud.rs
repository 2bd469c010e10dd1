//! The IBM Cloud test registry: which cases exist, what environment each one needs, and which
//! cloud assertions it runs with.
use std::sync::Arc;

use pp_core::errors::*;
use pp_core::feature::{
    Feature,
    skip,
};
use pp_core::k8s::*;
use pp_core::prelude::*;
use pp_ibmcloud::{
    IbmCloudProps,
    get_profile_type,
};
use tracing::*;

use crate::cases::*;
use crate::rolling_update::caa_daemonset_rolling_update;
use crate::test_case::TestCommand;

const SECURE_EXECUTION_PROFILE_PREFIX: &str = "bz2e";
const SECURE_EXECUTION_FACILITY: &str = "158";

const PVC_NAMESPACE: &str = "kube-system";
const PVC_NAME: &str = "my-pvc";
const PVC_MOUNT_PATH: &str = "/mount-path";
const PVC_STORAGE_CLASS: &str = "ibmc-vpc-block-5iops-tier";
const PVC_STORAGE_SIZE: &str = "10Gi";
const PVC_ACCESS_MODE: &str = "ReadWriteOnce";
const PVC_POD_NAME: &str = "nginx-pvc-pod";
const PVC_POD_IMAGE: &str = "nginx:latest";
const PVC_CONTAINER_NAME: &str = "nginx-pvc-container";
const CSI_CONTAINER_NAME: &str = "ibm-vpc-block-podvm-node-driver";
const CSI_IMAGE: &str = "gcr.io/k8s-staging-cloud-provider-ibm/ibm-vpc-block-csi-driver:v5.2.0";

#[derive(Clone, Debug, Default)]
pub struct SuiteOptions {
    pub rolling_update: bool,
    pub csi_wrapper: bool,
    pub registry_credential: Option<String>,
    pub registry_image: Option<String>,
}

pub struct IbmCloudSuite {
    props: IbmCloudProps,
    opts: SuiteOptions,
    cloud: Arc<dyn CloudAssert>,
    rolling: Arc<dyn RollingUpdateAssert>,
}

impl IbmCloudSuite {
    pub fn new(
        props: IbmCloudProps,
        opts: SuiteOptions,
        cloud: Arc<dyn CloudAssert>,
        rolling: Arc<dyn RollingUpdateAssert>,
    ) -> IbmCloudSuite {
        IbmCloudSuite { props, opts, cloud, rolling }
    }

    fn cloud(&self) -> Arc<dyn CloudAssert> {
        self.cloud.clone()
    }

    fn profile(&self, prefix: &str, config: &str) -> String {
        get_profile_type(prefix, config, &self.props)
    }
}

type CaseBuilder = fn(&IbmCloudSuite) -> anyhow::Result<Feature>;

pub const IBMCLOUD_TESTS: &[(&str, CaseBuilder)] = &[
    ("CreateSimplePod", |s| Ok(create_simple_pod(s.cloud()).into_feature())),
    ("CaaDaemonsetRollingUpdate", rolling_update),
    ("CreateConfidentialPod", confidential_pod),
    ("CreatePodWithConfigMap", |s| Ok(create_pod_with_config_map(s.cloud()).into_feature())),
    ("CreatePodWithSecret", |s| Ok(create_pod_with_secret(s.cloud()).into_feature())),
    ("CreatePeerPodContainerWithExternalIPAccess", |s| {
        Ok(create_pod_with_external_ip_access(s.cloud()).into_feature())
    }),
    ("CreatePeerPodWithJob", |s| Ok(create_peer_pod_with_job(s.cloud()).into_feature())),
    ("CreatePeerPodAndCheckUserLogs", |s| Ok(create_peer_pod_and_check_user_logs(s.cloud()).into_feature())),
    ("CreatePeerPodAndCheckWorkDirLogs", |s| {
        Ok(create_peer_pod_and_check_work_dir_logs(s.cloud()).into_feature())
    }),
    ("CreatePeerPodAndCheckEnvVariableLogsWithImageOnly", |s| {
        Ok(create_peer_pod_and_check_env_variable_logs_with_image_only(s.cloud()).into_feature())
    }),
    ("CreatePeerPodAndCheckEnvVariableLogsWithDeploymentOnly", |s| {
        Ok(create_peer_pod_and_check_env_variable_logs_with_deployment_only(s.cloud()).into_feature())
    }),
    ("CreatePeerPodAndCheckEnvVariableLogsWithImageAndDeployment", |s| {
        Ok(create_peer_pod_and_check_env_variable_logs_with_image_and_deployment(s.cloud()).into_feature())
    }),
    ("CreatePeerPodWithLargeImage", |s| Ok(create_peer_pod_with_large_image(s.cloud()).into_feature())),
    ("CreatePeerPodWithPVC", pvc_with_csi_wrapper),
    ("CreatePeerPodWithAuthenticatedImagewithValidCredentials", auth_valid_credentials),
    ("CreatePeerPodWithAuthenticatedImageWithInvalidCredentials", auth_invalid_credentials),
    ("CreatePeerPodWithAuthenticatedImageWithoutCredentials", auth_without_credentials),
    ("DeletePod", |s| Ok(delete_simple_pod(s.cloud()).into_feature())),
    ("PodVMwithNoAnnotations", |s| {
        Ok(pod_vm_with_no_annotations(s.cloud(), &s.profile("b", "2x8")).into_feature())
    }),
    ("PodVMwithAnnotationsInstanceType", |s| {
        Ok(pod_vm_with_annotations_instance_type(s.cloud(), &s.profile("c", "2x4")).into_feature())
    }),
    ("PodVMwithAnnotationsCPUMemory", |s| {
        Ok(pod_vm_with_annotations_cpu_memory(s.cloud(), &s.profile("m", "2x16")).into_feature())
    }),
    ("PodVMwithAnnotationsInvalidInstanceType", |s| {
        Ok(pod_vm_with_annotations_invalid_instance_type(s.cloud(), &s.profile("b", "2x4")).into_feature())
    }),
    ("PodVMwithAnnotationsLargerMemory", |s| Ok(pod_vm_with_annotations_larger_memory(s.cloud()).into_feature())),
    ("PodVMwithAnnotationsLargerCPU", |s| Ok(pod_vm_with_annotations_larger_cpu(s.cloud()).into_feature())),
];

// Builds every registered test whose name matches the filter, in registration order; tests that
// can't run in the current environment come back as skip errors
pub fn plan(suite: &IbmCloudSuite, filter: Option<&Regex>) -> Vec<(&'static str, anyhow::Result<Feature>)> {
    IBMCLOUD_TESTS
        .iter()
        .filter(|(name, _)| filter.is_none_or(|re| re.is_match(name)))
        .map(|(name, build)| (*name, build(suite)))
        .collect()
}

fn rolling_update(s: &IbmCloudSuite) -> anyhow::Result<Feature> {
    if !s.opts.rolling_update {
        bail!(skip("CAA DaemonSet upgrade test not enabled"));
    }
    Ok(caa_daemonset_rolling_update(s.rolling.clone()))
}

pub fn is_se_guest(stdout: &str) -> bool {
    let se = stdout.trim_matches('\n') == "1";
    info!("prot_virt_guest is {:?}, SE pod: {se}", stdout.trim());
    se
}

pub fn has_se_facility(stdout: &str) -> bool {
    let se = stdout.contains(SECURE_EXECUTION_FACILITY);
    info!("cpuinfo facilities: {}, SE pod: {se}", stdout.trim());
    se
}

fn confidential_pod(s: &IbmCloudSuite) -> anyhow::Result<Feature> {
    if !s.props.instance_profile.starts_with(SECURE_EXECUTION_PROFILE_PREFIX) {
        bail!(skip("instance profile does not support secure execution"));
    }

    let commands = vec![
        TestCommand::new(&["cat", "/sys/firmware/uv/prot_virt_guest"]).check_stdout(is_se_guest),
        TestCommand::new(&["grep", "facilities", "/proc/cpuinfo"]).check_stdout(has_se_facility),
    ];
    Ok(create_confidential_pod(s.cloud(), commands).into_feature())
}

fn pvc_with_csi_wrapper(s: &IbmCloudSuite) -> anyhow::Result<Feature> {
    if !s.opts.csi_wrapper {
        bail!(skip("PeerPod with PVC (CSI wrapper) test not enabled"));
    }

    let pvc = new_pvc(PVC_NAMESPACE, PVC_NAME, PVC_STORAGE_CLASS, PVC_STORAGE_SIZE, PVC_ACCESS_MODE);
    let pod = new_pod_with_pvc_from_ibm_vpc_block_driver(
        PVC_NAMESPACE,
        PVC_POD_NAME,
        PVC_CONTAINER_NAME,
        PVC_POD_IMAGE,
        CSI_CONTAINER_NAME,
        CSI_IMAGE,
        vec![with_pvc_binding(PVC_MOUNT_PATH, PVC_NAME)],
    );
    Ok(create_peer_pod_with_pvc_and_csi_wrapper(s.cloud(), pvc, pod, PVC_MOUNT_PATH).into_feature())
}

fn registry_credentials(s: &IbmCloudSuite) -> anyhow::Result<(&str, &str)> {
    match (&s.opts.registry_image, &s.opts.registry_credential) {
        (Some(image), Some(cred)) => Ok((image.as_str(), cred.as_str())),
        _ => bail!(skip("Registry Credentials not exported")),
    }
}

fn auth_valid_credentials(s: &IbmCloudSuite) -> anyhow::Result<Feature> {
    let (image, cred) = registry_credentials(s)?;
    Ok(create_peer_pod_with_authenticated_image_with_valid_credentials(s.cloud(), image, cred).into_feature())
}

fn auth_invalid_credentials(s: &IbmCloudSuite) -> anyhow::Result<Feature> {
    let (image, _) = registry_credentials(s)?;
    Ok(create_peer_pod_with_authenticated_image_with_invalid_credentials(s.cloud(), image).into_feature())
}

fn auth_without_credentials(s: &IbmCloudSuite) -> anyhow::Result<Feature> {
    let Some(image) = &s.opts.registry_image else {
        bail!(skip("Image Name not exported"));
    };
    Ok(create_peer_pod_with_authenticated_image_without_credentials(s.cloud(), image).into_feature())
}
