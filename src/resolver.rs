//! Find the Pods that mount a PersistentVolumeClaim
//!
//! Matching is purely by claim name as written in each Pod's volume list, so a
//! claim that was never created (or was already deleted) still matches the
//! Pods that reference it. Only the optional StorageClass filter looks at the
//! claim objects themselves.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::api::ClusterApi;
use crate::config::{PodFilter, Scope};
use crate::error::{PodResolutionError, Result};

/// Pre-GA annotation that older clusters use instead of `spec.storageClassName`
const LEGACY_STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

/// A Pod with at least one volume backed by a matching claim.
#[derive(Clone, Debug)]
pub struct BoundPod {
    pub namespace: String,
    pub name: String,
    /// Matching claim names, in volume order, without duplicates.
    pub claims: Vec<String>,
    pub pod: Pod,
}

/// Outcome of one scan: the bound Pods, plus the Pods whose claims could not
/// be checked.
#[derive(Debug, Default)]
pub struct PodScan {
    /// Sorted by (namespace, name).
    pub bound: Vec<BoundPod>,
    pub failures: Vec<PodResolutionError>,
}

impl PodScan {
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty() && self.failures.is_empty()
    }
}

/// Every claim a Pod's volumes reference.
///
/// Generic ephemeral volumes get a claim named `<pod>-<volume>`, so those are
/// included under that generated name.
pub fn pod_claim_names(pod: &Pod) -> Vec<String> {
    let pod_name = pod.name_any();
    let mut claims: Vec<String> = Vec::new();

    let volumes = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_ref())
        .into_iter()
        .flatten();

    for volume in volumes {
        let claim = if let Some(pvc) = &volume.persistent_volume_claim {
            Some(pvc.claim_name.clone())
        } else {
            volume
                .ephemeral
                .as_ref()
                .filter(|e| e.volume_claim_template.is_some())
                .map(|_| format!("{}-{}", pod_name, volume.name))
        };

        if let Some(claim) = claim
            && !claims.contains(&claim)
        {
            claims.push(claim);
        }
    }

    claims
}

/// Pods that are shutting down or have finished no longer need scaling down.
pub fn is_active(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    !matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

/// StorageClass a claim was provisioned from, if any.
pub fn claim_storage_class(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec
        .as_ref()
        .and_then(|spec| spec.storage_class_name.as_deref())
        .or_else(|| {
            pvc.annotations()
                .get(LEGACY_STORAGE_CLASS_ANNOTATION)
                .map(String::as_str)
        })
}

/// Find every active Pod in the scope that mounts a claim matching the filter.
///
/// Only listing Pods is fatal. A claim lookup that fails (for the StorageClass
/// filter) puts that one Pod into [`PodScan::failures`] and the scan goes on.
pub async fn find_bound_pods<A>(api: &A, scope: &Scope, filter: &PodFilter) -> Result<PodScan>
where
    A: ClusterApi + ?Sized,
{
    let pods = api.list_pods(scope).await?;
    let mut class_cache: HashMap<(String, String), bool> = HashMap::new();
    let mut scan = PodScan::default();

    'pods: for pod in pods {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();

        if !is_active(&pod) {
            debug!("Skipping inactive pod {}/{}", namespace, name);
            continue;
        }

        let mut claims = Vec::new();
        for claim in pod_claim_names(&pod) {
            if !filter.matches_claim_name(&claim) {
                continue;
            }
            if let Some(class) = filter.storage_class.as_deref() {
                let key = (namespace.clone(), claim.clone());
                let matches = match class_cache.get(&key) {
                    Some(matches) => *matches,
                    None => match api.get_pvc(&namespace, &claim).await {
                        Ok(pvc) => {
                            let matches = pvc
                                .is_some_and(|pvc| claim_storage_class(&pvc) == Some(class));
                            class_cache.insert(key, matches);
                            matches
                        }
                        Err(e) => {
                            warn!(
                                "Failed to read claim {}/{} of pod {}: {}",
                                namespace, claim, name, e
                            );
                            scan.failures.push(PodResolutionError {
                                namespace,
                                name,
                                source: Box::new(e),
                            });
                            continue 'pods;
                        }
                    },
                };
                if !matches {
                    continue;
                }
            }
            claims.push(claim);
        }

        if claims.is_empty() {
            continue;
        }

        debug!("Pod {}/{} mounts claims {:?}", namespace, name, claims);
        scan.bound.push(BoundPod {
            namespace,
            name,
            claims,
            pod,
        });
    }

    scan.bound
        .sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    scan.failures
        .sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    Ok(scan)
}
