use std::sync::Arc;

use async_trait::async_trait;
use pp_core::cloud::{
    CloudAssertError,
    is_pod_vm_for,
};
use pp_core::errors::*;
use pp_core::prelude::*;
use tokio::sync::Mutex;
use tracing::*;

use crate::VpcClient;

// The rolling update test runs a two-replica deployment
const MAX_CACHED_POD_VMS: usize = 2;

pub struct IbmCloudAssert {
    vpc: Arc<VpcClient>,
}

impl IbmCloudAssert {
    pub fn new(vpc: Arc<VpcClient>) -> IbmCloudAssert {
        IbmCloudAssert { vpc }
    }
}

#[async_trait]
impl CloudAssert for IbmCloudAssert {
    async fn has_pod_vm(&self, id: &str) -> EmptyResult {
        info!("looking for PodVM backing {id}");
        let instances = self.vpc.list_instances(None).await?;
        for instance in &instances {
            debug!("checking instance {} ({})", instance.name, instance.id);
            if is_pod_vm_for(&instance.name, id) {
                info!("found PodVM {} for {id}", instance.name);
                return Ok(());
            }
        }

        bail!(CloudAssertError::pod_vm_not_found(id));
    }

    async fn get_instance_type(&self, pod_name: &str) -> anyhow::Result<String> {
        let instances = self.vpc.list_instances(None).await?;
        instances
            .into_iter()
            .find(|i| is_pod_vm_for(&i.name, pod_name))
            .map(|i| i.profile.name)
            .ok_or_else(|| CloudAssertError::pod_vm_not_found(pod_name))
    }
}

pub struct IbmRollingUpdateAssert {
    vpc: Arc<VpcClient>,
    vpc_id: String,
    instance_ids: Mutex<Vec<String>>,
}

impl IbmRollingUpdateAssert {
    pub fn new(vpc: Arc<VpcClient>, vpc_id: &str) -> IbmRollingUpdateAssert {
        IbmRollingUpdateAssert {
            vpc,
            vpc_id: vpc_id.into(),
            instance_ids: Mutex::new(vec![]),
        }
    }

    pub async fn cached_ids(&self) -> Vec<String> {
        self.instance_ids.lock().await.clone()
    }
}

#[async_trait]
impl RollingUpdateAssert for IbmRollingUpdateAssert {
    async fn cache_pod_vm_ids(&self, deployment_name: &str) -> EmptyResult {
        let vpc_id = (!self.vpc_id.is_empty()).then_some(self.vpc_id.as_str());
        let ids: Vec<_> = self
            .vpc
            .list_instances(vpc_id)
            .await?
            .into_iter()
            .filter(|i| i.name.contains(deployment_name))
            .take(MAX_CACHED_POD_VMS)
            .map(|i| {
                info!("caching PodVM {} ({})", i.name, i.id);
                i.id
            })
            .collect();

        if ids.is_empty() {
            warn!("no PodVMs found for deployment {deployment_name}");
        }
        *self.instance_ids.lock().await = ids;
        Ok(())
    }

    async fn verify_old_vm_deleted(&self) -> EmptyResult {
        let ids = self.instance_ids.lock().await.clone();
        if ids.is_empty() {
            warn!("no PodVMs were cached, nothing to verify");
        }

        for id in &ids {
            match self.vpc.get_instance(id).await {
                Ok(Some(_)) => bail!(CloudAssertError::instance_still_exists(id)),
                Ok(None) => info!("PodVM instance {id} has been deleted"),
                // any lookup failure counts as deleted
                Err(err) => info!("PodVM instance {id} has been deleted ({err})"),
            }
        }
        Ok(())
    }
}
