// Peer-pod runtime
pub const PEER_POD_RUNTIME_CLASS: &str = "kata-remote";
pub const PODVM_NAME_PREFIX: &str = "podvm";

// cloud-api-adaptor (CAA) deployment
pub const CAA_NAMESPACE: &str = "confidential-containers-system";
pub const CAA_DAEMONSET_NAME: &str = "cloud-api-adaptor-daemonset";
pub const CAA_POD_LABEL_SELECTOR: &str = "app=cloud-api-adaptor";

// Well-known labels and annotations
pub const JOB_NAME_LABEL_KEY: &str = "job-name";
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
pub const MACHINE_TYPE_ANNOTATION_KEY: &str = "io.katacontainers.config.hypervisor.machine_type";
pub const DEFAULT_VCPUS_ANNOTATION_KEY: &str = "io.katacontainers.config.hypervisor.default_vcpus";
pub const DEFAULT_MEMORY_ANNOTATION_KEY: &str = "io.katacontainers.config.hypervisor.default_memory";

// Images
pub const NGINX_IMAGE: &str = "nginx";
pub const BUSYBOX_IMAGE: &str = "quay.io/prometheus/busybox:latest";
pub const CURL_IMAGE: &str = "radial/busyboxplus:curl";
pub const TEST_IMAGES_REPO: &str = "quay.io/confidential-containers/test-images";
pub const CSI_PODVM_WRAPPER_IMAGE: &str = "quay.io/confidential-containers/csi-podvm-wrapper:latest";

// Pod phases, event types, and the like
pub const POD_RUNNING: &str = "Running";
pub const POD_PENDING: &str = "Pending";
pub const POD_SUCCEEDED: &str = "Succeeded";
pub const RESTART_POLICY_NEVER: &str = "Never";
pub const PULL_ALWAYS: &str = "Always";
pub const EVENT_TYPE_NORMAL: &str = "Normal";
pub const EVENT_TYPE_WARNING: &str = "Warning";
pub const AUTH_STATUS_COMPLETED: &str = "Completed";
pub const AUTH_STATUS_FAILED: &str = "Failed";

// Env vars
pub const CI_ENV_VAR: &str = "CI";
pub const TEST_CAA_ROLLING_UPDATE_ENV_VAR: &str = "TEST_CAA_ROLLING_UPDATE";
pub const TEST_CSI_WRAPPER_ENV_VAR: &str = "TEST_CSI_WRAPPER";
pub const REGISTRY_CREDENTIAL_ENCODED_ENV_VAR: &str = "REGISTRY_CREDENTIAL_ENCODED";
pub const AUTHENTICATED_REGISTRY_IMAGE_ENV_VAR: &str = "AUTHENTICATED_REGISTRY_IMAGE";

// Timing
pub const RETRY_DELAY_SECONDS: u64 = 5;
pub const LOG_SETTLE_SECONDS: u64 = 5;
pub const WAIT_POD_RUNNING_TIMEOUT_SECONDS: u64 = 600;
pub const WAIT_LARGE_IMAGE_POD_RUNNING_TIMEOUT_SECONDS: u64 = 900;
pub const WAIT_JOB_FINISHED_TIMEOUT_SECONDS: u64 = 300;
pub const WAIT_DEPLOYMENT_AVAILABLE_TIMEOUT_SECONDS: u64 = 180;
pub const WAIT_POD_DELETED_TIMEOUT_SECONDS: u64 = 180;
pub const WAIT_EVENT_TIMEOUT_SECONDS: u64 = 300;
pub const OLD_VM_DELETION_TIMEOUT_SECONDS: u64 = 60;
