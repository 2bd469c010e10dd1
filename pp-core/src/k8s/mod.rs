mod builders;
mod pod_ext;
mod util;

pub use builders::*;
pub use util::*;

use crate::errors::*;
use crate::prelude::*;

err_impl! {KubernetesError,
    #[error("field not found in struct: {0}")]
    FieldNotFound(String),

    #[error("object has no namespace: {0}")]
    MissingNamespace(String),
}

pub trait KubeResourceExt {
    fn namespaced_name(&self) -> String;
}

pub trait PodExt {
    fn spec(&self) -> anyhow::Result<&corev1::PodSpec>;
    fn phase(&self) -> Option<&str>;
    fn first_container(&self) -> anyhow::Result<&corev1::Container>;
    fn first_container_state(&self) -> Option<&corev1::ContainerState>;
}

#[cfg(test)]
pub mod tests;
