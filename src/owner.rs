//! Owner chain walker
//!
//! Follows controller owner references upward from a Pod (Pod -> ReplicaSet ->
//! Deployment, Pod -> StatefulSet, ...) until it reaches an object with no
//! controller. Every hop is a fresh API lookup; nothing is cached.

use std::collections::HashSet;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::api::{ClusterApi, ObjectRef};
use crate::error::{Error, Result};
use crate::targets::Target;

/// Upper bound on owner lookups for a single Pod
pub const MAX_OWNER_DEPTH: usize = 10;

/// The owner reference flagged as the managing controller, if any.
///
/// Non-controller owners (e.g. objects added for garbage collection only)
/// are ignored.
pub fn controller_of(owners: &[OwnerReference]) -> Option<&OwnerReference> {
    owners.iter().find(|owner| owner.controller == Some(true))
}

/// Resolve a Pod to the object that has to be stopped to release its volumes.
///
/// - No controller owner: the Pod itself.
/// - Owner missing from the API: that owner, with unknown replicas.
/// - Otherwise: the first object up the chain with no controller owner.
pub async fn resolve_root<A>(api: &A, pod: &Pod) -> Result<Target>
where
    A: ClusterApi + ?Sized,
{
    let namespace = pod
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let pod_name = pod.name_any();

    let Some(first) = controller_of(pod.owner_references()) else {
        debug!("Pod {}/{} has no controller", namespace, pod_name);
        return Ok(Target::pod(namespace, pod_name));
    };

    let mut current = ObjectRef::from_owner_reference(first, &namespace);
    let mut visited: HashSet<ObjectRef> = HashSet::new();

    for hop in 1..=MAX_OWNER_DEPTH {
        if !visited.insert(current.clone()) {
            break;
        }

        let Some(owner) = api.get_owner(&current).await? else {
            warn!(
                "Owner {} of pod {}/{} not found, treating it as the root",
                current, namespace, pod_name
            );
            return Ok(Target::Controller {
                reference: current,
                replicas: None,
                missing: true,
            });
        };

        match controller_of(&owner.owner_references) {
            None => {
                debug!(
                    "Pod {}/{} resolved to {} after {} hop(s)",
                    namespace, pod_name, current, hop
                );
                return Ok(Target::Controller {
                    reference: owner.reference,
                    replicas: owner.replicas,
                    missing: false,
                });
            }
            Some(parent) => {
                let next = ObjectRef::from_owner_reference(parent, &namespace);
                debug!("{} is controlled by {}", current, next);
                current = next;
            }
        }
    }

    Err(Error::OwnerChainTooDeep {
        kind: "Pod".to_string(),
        namespace,
        name: pod_name,
        max_depth: MAX_OWNER_DEPTH,
    })
}
