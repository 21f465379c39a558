//! Test fixtures: Pod/owner builders and an in-memory cluster
//!
//! [`FakeCluster`] implements [`ClusterApi`] over plain maps so the whole
//! resolve/gate/execute pipeline can run without an API server.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let cluster = FakeCluster::new();
//! cluster.add_deployment_with_pods("ns1", "web", 2, "data");
//! cluster.add_pod(PodBuilder::new("ns1", "debug").with_claim("data").build());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, Pod,
    PodSpec, PodStatus, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::core::ObjectMeta;
use kubectl_unmount::{ClusterApi, Error, ObjectRef, OwnerObject, Result, Scope, WorkloadKind};

// =============================================================================
// Owner references and objects
// =============================================================================

/// API version for a built-in kind
pub fn api_version_for(kind: &str) -> &'static str {
    match kind {
        "Deployment" | "StatefulSet" | "ReplicaSet" | "DaemonSet" => "apps/v1",
        "Job" | "CronJob" => "batch/v1",
        "ReplicationController" | "Pod" => "v1",
        _ => "example.com/v1",
    }
}

/// Owner reference flagged as the managing controller
pub fn controller_ref(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: api_version_for(kind).to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("{}-uid", name),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Owner reference without the controller flag
pub fn plain_owner_ref(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        controller: None,
        block_owner_deletion: None,
        ..controller_ref(kind, name)
    }
}

/// Owner object of any kind, optionally controlled by another owner
pub fn owner_object(
    kind: &str,
    namespace: &str,
    name: &str,
    replicas: Option<i32>,
    controlled_by: Option<OwnerReference>,
) -> OwnerObject {
    OwnerObject {
        reference: object_ref(kind, namespace, name),
        owner_references: controlled_by.into_iter().collect(),
        replicas,
    }
}

pub fn object_ref(kind: &str, namespace: &str, name: &str) -> ObjectRef {
    ObjectRef {
        api_version: api_version_for(kind).to_string(),
        kind: WorkloadKind::from(kind),
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

// =============================================================================
// Pod Builder
// =============================================================================

/// Builder for Pod test fixtures
pub struct PodBuilder {
    namespace: String,
    name: String,
    volumes: Vec<Volume>,
    owners: Vec<OwnerReference>,
    terminating: bool,
    phase: Option<String>,
}

#[allow(dead_code)]
impl PodBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            volumes: Vec::new(),
            owners: Vec::new(),
            terminating: false,
            phase: Some("Running".to_string()),
        }
    }

    /// Mount a PVC under a volume named after the claim
    pub fn with_claim(self, claim: &str) -> Self {
        let volume = format!("{}-volume", claim);
        self.with_claim_volume(&volume, claim)
    }

    pub fn with_claim_volume(mut self, volume: &str, claim: &str) -> Self {
        self.volumes.push(Volume {
            name: volume.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.to_string(),
                read_only: None,
            }),
            ..Default::default()
        });
        self
    }

    pub fn with_empty_dir(mut self, volume: &str) -> Self {
        self.volumes.push(Volume {
            name: volume.to_string(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        });
        self
    }

    pub fn owned_by(mut self, owner: OwnerReference) -> Self {
        self.owners.push(owner);
        self
    }

    pub fn controlled_by(self, kind: &str, name: &str) -> Self {
        self.owned_by(controller_ref(kind, name))
    }

    pub fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }

    pub fn with_phase(mut self, phase: &str) -> Self {
        self.phase = Some(phase.to_string());
        self
    }

    pub fn build(self) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                owner_references: if self.owners.is_empty() {
                    None
                } else {
                    Some(self.owners)
                },
                deletion_timestamp: self.terminating.then(|| Time(Default::default())),
                ..Default::default()
            },
            spec: Some(PodSpec {
                volumes: Some(self.volumes),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: self.phase,
                ..Default::default()
            }),
        }
    }
}

/// PVC with an optional StorageClass
pub fn pvc(namespace: &str, name: &str, storage_class: Option<&str>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: storage_class.map(str::to_string),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// In-memory cluster
// =============================================================================

/// A mutation the executor performed against the fake cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    PatchReplicas { target: String, replicas: i32 },
    DeletePod { namespace: String, name: String },
}

type PodKey = (String, String);
type OwnerKey = (String, String, String);

#[derive(Default)]
struct FakeState {
    pods: BTreeMap<PodKey, Pod>,
    pvcs: BTreeMap<PodKey, PersistentVolumeClaim>,
    owners: BTreeMap<OwnerKey, OwnerObject>,
    failing_patches: HashSet<OwnerKey>,
    failing_deletes: HashSet<PodKey>,
    failing_owner_gets: HashSet<OwnerKey>,
    failing_pvc_gets: HashSet<PodKey>,
    mutations: Vec<Mutation>,
    owner_lookups: usize,
    pvc_lookups: usize,
}

fn owner_key(kind: &str, namespace: &str, name: &str) -> OwnerKey {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

fn forbidden(message: &str) -> Error {
    Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Forbidden".to_string(),
        code: 403,
    }))
}

/// In-memory [`ClusterApi`]
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

#[allow(dead_code)]
impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pod(&self, pod: Pod) {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.state.lock().unwrap().pods.insert(key, pod);
    }

    pub fn add_pvc(&self, pvc: PersistentVolumeClaim) {
        let key = (
            pvc.metadata.namespace.clone().unwrap_or_default(),
            pvc.metadata.name.clone().unwrap_or_default(),
        );
        self.state.lock().unwrap().pvcs.insert(key, pvc);
    }

    pub fn add_owner(&self, owner: OwnerObject) {
        let key = owner_key(
            owner.reference.kind.as_str(),
            &owner.reference.namespace,
            &owner.reference.name,
        );
        self.state.lock().unwrap().owners.insert(key, owner);
    }

    /// Deployment -> ReplicaSet `<name>-rs` -> `replicas` Pods mounting `claim`
    pub fn add_deployment_with_pods(&self, namespace: &str, name: &str, replicas: i32, claim: &str) {
        let rs_name = format!("{}-rs", name);
        self.add_owner(owner_object("Deployment", namespace, name, Some(replicas), None));
        self.add_owner(owner_object(
            "ReplicaSet",
            namespace,
            &rs_name,
            Some(replicas),
            Some(controller_ref("Deployment", name)),
        ));
        for i in 0..replicas {
            self.add_pod(
                PodBuilder::new(namespace, &format!("{}-{}", rs_name, i))
                    .with_claim(claim)
                    .controlled_by("ReplicaSet", &rs_name)
                    .build(),
            );
        }
    }

    /// StatefulSet with `replicas` Pods, each mounting `<claim_prefix>-<name>-<i>`
    pub fn add_statefulset_with_pods(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
        claim_prefix: &str,
    ) {
        self.add_owner(owner_object("StatefulSet", namespace, name, Some(replicas), None));
        for i in 0..replicas {
            self.add_pod(
                PodBuilder::new(namespace, &format!("{}-{}", name, i))
                    .with_claim(&format!("{}-{}-{}", claim_prefix, name, i))
                    .controlled_by("StatefulSet", name)
                    .build(),
            );
        }
    }

    pub fn remove_owner(&self, kind: &str, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .owners
            .remove(&owner_key(kind, namespace, name));
    }

    pub fn fail_patch_for(&self, kind: &str, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_patches
            .insert(owner_key(kind, namespace, name));
    }

    pub fn fail_delete_for(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert((namespace.to_string(), name.to_string()));
    }

    pub fn fail_get_for(&self, kind: &str, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_owner_gets
            .insert(owner_key(kind, namespace, name));
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn owner_lookups(&self) -> usize {
        self.state.lock().unwrap().owner_lookups
    }

    /// Make reading this claim fail with a 403
    pub fn fail_pvc_get_for(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_pvc_gets
            .insert((namespace.to_string(), name.to_string()));
    }

    pub fn pvc_lookups(&self) -> usize {
        self.state.lock().unwrap().pvc_lookups
    }

    pub fn replicas_of(&self, kind: &str, namespace: &str, name: &str) -> Option<i32> {
        self.state
            .lock()
            .unwrap()
            .owners
            .get(&owner_key(kind, namespace, name))
            .and_then(|o| o.replicas)
    }

    pub fn has_pod(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .pods
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn pod_count(&self) -> usize {
        self.state.lock().unwrap().pods.len()
    }

    /// Remove every Pod whose controller chain reaches an owner scaled to zero,
    /// the way the workload controllers would once they observe the patch.
    pub fn settle(&self) {
        let mut state = self.state.lock().unwrap();
        let owners = state.owners.clone();
        state.pods.retain(|(namespace, _), pod| {
            let mut next = pod
                .metadata
                .owner_references
                .iter()
                .flatten()
                .find(|o| o.controller == Some(true))
                .cloned();
            let mut hops = 0;
            while let Some(owner) = next {
                hops += 1;
                if hops > 20 {
                    break;
                }
                let Some(obj) = owners.get(&owner_key(&owner.kind, namespace, &owner.name)) else {
                    break;
                };
                if obj.replicas == Some(0) {
                    return false;
                }
                next = obj
                    .owner_references
                    .iter()
                    .find(|o| o.controller == Some(true))
                    .cloned();
            }
            true
        });
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_pods(&self, scope: &Scope) -> Result<Vec<Pod>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pods
            .iter()
            .filter(|((namespace, _), _)| scope.namespace().is_none_or(|ns| ns == namespace))
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        let mut state = self.state.lock().unwrap();
        state.pvc_lookups += 1;
        if state
            .failing_pvc_gets
            .contains(&(namespace.to_string(), name.to_string()))
        {
            return Err(forbidden("get is forbidden"));
        }
        Ok(state
            .pvcs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_owner(&self, owner: &ObjectRef) -> Result<Option<OwnerObject>> {
        let mut state = self.state.lock().unwrap();
        state.owner_lookups += 1;
        let key = owner_key(owner.kind.as_str(), &owner.namespace, &owner.name);
        if state.failing_owner_gets.contains(&key) {
            return Err(forbidden("get is forbidden"));
        }
        Ok(state.owners.get(&key).cloned())
    }

    async fn patch_replicas(&self, target: &ObjectRef, replicas: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = owner_key(target.kind.as_str(), &target.namespace, &target.name);
        if state.failing_patches.contains(&key) {
            return Err(forbidden("patch is forbidden"));
        }
        let Some(owner) = state.owners.get_mut(&key) else {
            return Err(Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("{} not found", target),
                reason: "NotFound".to_string(),
                code: 404,
            })));
        };
        owner.replicas = Some(replicas);
        state.mutations.push(Mutation::PatchReplicas {
            target: target.to_string(),
            replicas,
        });
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        if state.failing_deletes.contains(&key) {
            return Err(forbidden("delete is forbidden"));
        }
        state.pods.remove(&key);
        state.mutations.push(Mutation::DeletePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Reporter helpers
// =============================================================================

/// Split captured output into trimmed, non-empty lines
pub fn lines(buf: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(buf)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Sort for set-equality assertions on the output stream
pub fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}

/// Writer whose reader has gone away
pub struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }
}
