use super::*;

impl PodExt for corev1::Pod {
    fn spec(&self) -> anyhow::Result<&corev1::PodSpec> {
        match self.spec.as_ref() {
            None => bail!(KubernetesError::field_not_found("pod spec")),
            Some(ps) => Ok(ps),
        }
    }

    fn phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }

    fn first_container(&self) -> anyhow::Result<&corev1::Container> {
        match self.spec()?.containers.first() {
            None => bail!(KubernetesError::field_not_found("pod containers")),
            Some(c) => Ok(c),
        }
    }

    // Peer pods in this suite are (almost) always single-container, so the first container status
    // is the one every assertion cares about
    fn first_container_state(&self) -> Option<&corev1::ContainerState> {
        self.status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|cs| cs.first())
            .and_then(|cs| cs.state.as_ref())
    }
}
