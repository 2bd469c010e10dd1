//! Each cloud provider that can host peer pods implements these traits so the suite can check
//! what actually happened on the provider side; a PodVM backing pod `foo` is expected to be named
//! `podvm-foo-<sandbox id prefix>`.
use async_trait::async_trait;
#[cfg(feature = "mock")]
use mockall::automock;

use crate::errors::*;
use crate::prelude::*;

err_impl! {CloudAssertError,
    #[error("PodVM was not created for pod {0}")]
    PodVmNotFound(String),

    #[error("PodVM instance {0} still exists")]
    InstanceStillExists(String),
}

#[cfg_attr(feature = "mock", automock)]
#[async_trait]
pub trait CloudAssert: Send + Sync {
    // Fails unless there is a PodVM for the pod with the given name
    async fn has_pod_vm(&self, id: &str) -> EmptyResult;

    // Returns the instance type (e.g., profile name) of the PodVM backing the given pod
    async fn get_instance_type(&self, pod_name: &str) -> anyhow::Result<String>;
}

#[cfg_attr(feature = "mock", automock)]
#[async_trait]
pub trait RollingUpdateAssert: Send + Sync {
    // Remembers the PodVMs backing a deployment before the CAA daemonset is restarted
    async fn cache_pod_vm_ids(&self, deployment_name: &str) -> EmptyResult;

    // Fails if any of the cached PodVMs still exist
    async fn verify_old_vm_deleted(&self) -> EmptyResult;
}

pub fn podvm_name_prefix(pod_name: &str) -> String {
    format!("{PODVM_NAME_PREFIX}-{pod_name}-")
}

// TODO: the PodVM name is podvm-POD_NAME-SANDBOX_ID with the sandbox ID truncated to 8 chars, so
// we could match exactly if the sandbox ID were exposed on the pod.
pub fn is_pod_vm_for(instance_name: &str, pod_name: &str) -> bool {
    instance_name.starts_with(&podvm_name_prefix(pod_name))
}
