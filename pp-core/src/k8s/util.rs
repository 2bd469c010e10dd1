use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    DeleteParams,
    LogParams,
    PostParams,
};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::*;

use super::*;

const DEFAULT_RANDOM_NAME_LEN: usize = 32;

// Everything the suite creates and tears down is namespace-scoped; this just saves us from
// repeating the same half-dozen bounds on every generic helper
pub trait NamespacedObj:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Serialize
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<T> NamespacedObj for T where
    T: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static
{
}

impl<T: kube::Resource> KubeResourceExt for T {
    fn namespaced_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name_any()),
            None => self.name_any(),
        }
    }
}

// Returns `prefix-<hex>` truncated to n characters total; if the prefix alone is already at least
// n characters long, the prefix is returned unchanged (so random_name("default", 7) == "default").
pub fn random_name(prefix: &str, n: usize) -> String {
    let n = if n == 0 { DEFAULT_RANDOM_NAME_LEN } else { n };
    if prefix.len() >= n {
        return prefix.into();
    }

    let mut rng = rand::rng();
    let suffix: String = (0..n).map(|_| format!("{:02x}", rng.random::<u8>())).collect();
    let mut name = format!("{prefix}-{suffix}");
    name.truncate(n);
    name
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(kube::core::ErrorResponse { code: 404, .. }))
}

pub fn namespaced_api<K: NamespacedObj>(client: kube::Client, obj: &K) -> anyhow::Result<kube::Api<K>> {
    match obj.namespace() {
        Some(ns) => Ok(kube::Api::namespaced(client, &ns)),
        None => bail!(KubernetesError::missing_namespace(&obj.name_any())),
    }
}

pub async fn create_obj<K: NamespacedObj>(client: kube::Client, obj: &K) -> anyhow::Result<K> {
    info!("creating {}", obj.namespaced_name());
    Ok(namespaced_api(client, obj)?.create(&PostParams::default(), obj).await?)
}

// Deleting something that's already gone is fine; some test cases delete their own pods as part
// of the assessment, and teardown still tries to clean them up afterwards
pub async fn delete_obj<K: NamespacedObj>(client: kube::Client, obj: &K, params: &DeleteParams) -> EmptyResult {
    info!("deleting {}", obj.namespaced_name());
    match namespaced_api(client, obj)?.delete(&obj.name_any(), params).await {
        Ok(_) => Ok(()),
        Err(err) if is_not_found(&err) => {
            debug!("{} was already deleted", obj.namespaced_name());
            Ok(())
        },
        Err(err) => Err(err.into()),
    }
}

// Returns true if the namespace had to be created, so the caller knows whether to clean it up
pub async fn ensure_namespace(client: kube::Client, name: &str) -> anyhow::Result<bool> {
    let ns_api: kube::Api<corev1::Namespace> = kube::Api::all(client);
    if ns_api.get_opt(name).await?.is_some() {
        return Ok(false);
    }

    info!("creating namespace {name}");
    let ns = corev1::Namespace {
        metadata: metav1::ObjectMeta { name: Some(name.into()), ..Default::default() },
        ..Default::default()
    };
    ns_api.create(&PostParams::default(), &ns).await?;
    Ok(true)
}

pub async fn delete_namespace(client: kube::Client, name: &str) -> EmptyResult {
    info!("deleting namespace {name}");
    let ns_api: kube::Api<corev1::Namespace> = kube::Api::all(client);
    match ns_api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(err) if is_not_found(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub async fn read_pod_logs(
    client: kube::Client,
    namespace: &str,
    pod_name: &str,
    container: Option<&str>,
) -> anyhow::Result<String> {
    let pod_api: kube::Api<corev1::Pod> = kube::Api::namespaced(client, namespace);
    let params = LogParams { container: container.map(String::from), ..Default::default() };
    Ok(pod_api.logs(pod_name, &params).await?)
}
