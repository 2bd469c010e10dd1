pub const TEST_NAMESPACE: &str = "test-namespace";
pub const TEST_POD: &str = "test-pod";
pub const TEST_JOB: &str = "test-job";
pub const TEST_DEPLOYMENT: &str = "nginx-deployment";
pub const TEST_NODE: &str = "worker-0";
pub const TEST_CAA_POD: &str = "cloud-api-adaptor-daemonset-abcde";
pub const TEST_VPC_ID: &str = "r006-1234-vpc";
pub const TEST_INSTANCE_ID: &str = "0717_abcd-1234";
pub const TEST_API_KEY: &str = "not-a-real-api-key";
