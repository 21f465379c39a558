//! Narrow Kubernetes API surface used by the resolver, walker and executor
//!
//! Everything that talks to the API server goes through [`ClusterApi`]. The
//! production implementation is [`KubeClusterApi`]; tests substitute an
//! in-memory cluster.

mod client;

pub use client::{FIELD_MANAGER, KubeClusterApi, api_resource};

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::ResourceExt;

use crate::config::Scope;
use crate::error::Result;
use crate::workload::WorkloadKind;

/// Identity of an owner object whose kind is only known at runtime. The
/// namespace is the referencing Pod's; cluster-scoped kinds ignore it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    /// The object an owner reference points at. Owners always live in the
    /// namespace of the object that references them.
    pub fn from_owner_reference(owner: &OwnerReference, namespace: &str) -> Self {
        Self {
            api_version: owner.api_version.clone(),
            kind: WorkloadKind::from(owner.kind.as_str()),
            namespace: namespace.to_string(),
            name: owner.name.clone(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Snapshot of an owner object, as much of it as the walker needs.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnerObject {
    pub reference: ObjectRef,
    pub owner_references: Vec<OwnerReference>,
    /// `spec.replicas`, when the kind has one.
    pub replicas: Option<i32>,
}

impl OwnerObject {
    pub fn from_dynamic(reference: ObjectRef, obj: &DynamicObject) -> Self {
        let replicas = obj
            .data
            .get("spec")
            .and_then(|spec| spec.get("replicas"))
            .and_then(|r| r.as_i64())
            .and_then(|r| i32::try_from(r).ok());

        Self {
            reference,
            owner_references: obj.owner_references().to_vec(),
            replicas,
        }
    }
}

/// The operations the core needs from the API server.
///
/// `get_*` methods return `Ok(None)` for objects that do not exist so that
/// callers can tell a missing object from a failed request.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List Pods in the scope.
    async fn list_pods(&self, scope: &Scope) -> Result<Vec<Pod>>;

    /// Get a PersistentVolumeClaim by name.
    async fn get_pvc(&self, namespace: &str, name: &str)
    -> Result<Option<PersistentVolumeClaim>>;

    /// Fetch an arbitrary owner object.
    async fn get_owner(&self, owner: &ObjectRef) -> Result<Option<OwnerObject>>;

    /// Set `spec.replicas` on a controller.
    async fn patch_replicas(&self, target: &ObjectRef, replicas: i32) -> Result<()>;

    /// Delete a Pod. Deleting a Pod that is already gone succeeds.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
}
