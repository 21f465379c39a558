use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, Scope as ResourceScope};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ClusterApi, ObjectRef, OwnerObject};
use crate::config::Scope;
use crate::error::{Result, is_not_found};

/// Field manager recorded on patches made by this tool
pub const FIELD_MANAGER: &str = "kubectl-unmount";

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Build the `ApiResource` for a kind named in an owner reference.
///
/// The plural is guessed from the kind, which is correct for every built-in
/// workload and for custom resources that follow the usual naming. Used when
/// discovery is unavailable.
pub fn api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
    ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind))
}

/// Namespace to address an owner in. Cluster-scoped kinds have none, even
/// when the owner reference came from a namespaced Pod.
pub fn owner_namespace<'a>(scope: &ResourceScope, namespace: &'a str) -> Option<&'a str> {
    match scope {
        ResourceScope::Cluster => None,
        ResourceScope::Namespaced => Some(namespace),
    }
}

type ResourceKey = (String, String);

/// [`ClusterApi`] backed by a live API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    /// Discovered resource and scope per (apiVersion, kind).
    resources: Arc<Mutex<HashMap<ResourceKey, (ApiResource, ResourceScope)>>>,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Look up the plural and scope of a kind through discovery, once per
    /// kind. If discovery fails the plural is guessed and the kind is assumed
    /// to be namespaced.
    async fn resource_for(&self, target: &ObjectRef) -> (ApiResource, ResourceScope) {
        let key = (target.api_version.clone(), target.kind.as_str().to_string());
        let cached = self
            .resources
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).cloned());
        if let Some(found) = cached {
            return found;
        }

        let (group, version) = target
            .api_version
            .split_once('/')
            .unwrap_or(("", target.api_version.as_str()));
        let gvk = GroupVersionKind::gvk(group, version, target.kind.as_str());
        let found = match discovery::pinned_kind(&self.client, &gvk).await {
            Ok((ar, caps)) => (ar, caps.scope),
            Err(e) => {
                debug!(
                    "Discovery failed for {}/{}, guessing: {}",
                    target.api_version, target.kind, e
                );
                return (
                    api_resource(&target.api_version, target.kind.as_str()),
                    ResourceScope::Namespaced,
                );
            }
        };

        if let Ok(mut cache) = self.resources.lock() {
            cache.insert(key, found.clone());
        }
        found
    }

    async fn dynamic_api(&self, target: &ObjectRef) -> Api<DynamicObject> {
        let (ar, scope) = self.resource_for(target).await;
        match owner_namespace(&scope, &target.namespace) {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_pods(&self, scope: &Scope) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = scoped_api(self.client.clone(), scope.namespace());
        let list = pods.list(&ListParams::default()).await?;
        debug!("Listed {} pods in {}", list.items.len(), scope);
        Ok(list.items)
    }

    async fn get_pvc(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>> {
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(pvcs.get_opt(name).await?)
    }

    async fn get_owner(&self, owner: &ObjectRef) -> Result<Option<OwnerObject>> {
        let api = self.dynamic_api(owner).await;
        match api.get_opt(&owner.name).await? {
            Some(obj) => Ok(Some(OwnerObject::from_dynamic(owner.clone(), &obj))),
            None => Ok(None),
        }
    }

    async fn patch_replicas(&self, target: &ObjectRef, replicas: i32) -> Result<()> {
        let api = self.dynamic_api(target).await;
        let patch = serde_json::json!({
            "spec": {
                "replicas": replicas
            }
        });
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch(&target.name, &params, &Patch::Merge(&patch)).await?;
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match pods.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("Pod {}/{} already deleted", namespace, name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
