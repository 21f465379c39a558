//! Scale-down targets and the deduplicated set built from bound Pods

use std::collections::HashSet;
use std::fmt;

use tracing::warn;

use crate::api::{ClusterApi, ObjectRef};
use crate::error::{Error, PodResolutionError, Result};
use crate::owner::resolve_root;
use crate::resolver::BoundPod;
use crate::workload::ScaleStrategy;

/// One thing to take out of service so that a claim is released.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// A Pod with no controlling owner.
    Pod { namespace: String, name: String },
    /// The root controller of one or more bound Pods.
    Controller {
        reference: ObjectRef,
        /// `spec.replicas` when the walk fetched the object.
        replicas: Option<i32>,
        /// The owner reference pointed at an object that no longer exists.
        missing: bool,
    },
}

/// Identity used for deduplication: (kind, namespace, name).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl Target {
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Target::Pod {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Target::Pod { .. } => "Pod",
            Target::Controller { reference, .. } => reference.kind.as_str(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Target::Pod { namespace, .. } => namespace,
            Target::Controller { reference, .. } => &reference.namespace,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Target::Pod { name, .. } => name,
            Target::Controller { reference, .. } => &reference.name,
        }
    }

    pub fn key(&self) -> TargetKey {
        TargetKey {
            kind: self.kind().to_string(),
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
        }
    }

    /// How a controller target is stopped. `None` for bare Pods.
    pub fn scale_strategy(&self) -> Option<ScaleStrategy> {
        match self {
            Target::Pod { .. } => None,
            Target::Controller {
                reference,
                replicas,
                ..
            } => Some(reference.kind.strategy_for(*replicas)),
        }
    }
}

/// `<Kind>/<Namespace>/<Name>`, the stable form written to the output stream.
impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind(), self.namespace(), self.name())
    }
}

/// Insertion-ordered set of targets, unique by [`TargetKey`].
#[derive(Debug, Default)]
pub struct TargetSet {
    seen: HashSet<TargetKey>,
    targets: Vec<Target>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target. Returns `false` if an equal key was already present,
    /// in which case the first one wins.
    pub fn insert(&mut self, target: Target) -> bool {
        if !self.seen.insert(target.key()) {
            return false;
        }
        self.targets.push(target);
        true
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn into_vec(self) -> Vec<Target> {
        self.targets
    }
}

/// Result of resolving every bound Pod.
#[derive(Debug, Default)]
pub struct TargetPlan {
    /// Bound Pods before deduplication.
    pub pods_found: usize,
    /// Deduplicated targets in first-seen order.
    pub targets: Vec<Target>,
    /// Pods whose root could not be determined. Each becomes a failed entry
    /// when the plan is executed.
    pub unresolved: Vec<PodResolutionError>,
}

impl TargetPlan {
    /// Nothing to act on and nothing to report.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.unresolved.is_empty()
    }
}

impl From<Vec<Target>> for TargetPlan {
    fn from(targets: Vec<Target>) -> Self {
        TargetPlan {
            pods_found: targets.len(),
            targets,
            unresolved: Vec::new(),
        }
    }
}

/// Resolve each Pod to its root and deduplicate the results.
///
/// A Pod whose owner cannot be read is set aside in
/// [`TargetPlan::unresolved`] and the rest go ahead. An owner chain that is
/// too deep or cyclic fails the whole plan.
pub async fn build_targets<A>(api: &A, pods: &[BoundPod]) -> Result<TargetPlan>
where
    A: ClusterApi + ?Sized,
{
    let mut set = TargetSet::new();
    let mut unresolved = Vec::new();

    for bound in pods {
        match resolve_root(api, &bound.pod).await {
            Ok(target) => {
                set.insert(target);
            }
            Err(e @ Error::OwnerChainTooDeep { .. }) => return Err(e),
            Err(e) => {
                warn!(
                    "Failed to resolve owner of pod {}/{}: {}",
                    bound.namespace, bound.name, e
                );
                unresolved.push(PodResolutionError {
                    namespace: bound.namespace.clone(),
                    name: bound.name.clone(),
                    source: Box::new(e),
                });
            }
        }
    }

    Ok(TargetPlan {
        pods_found: pods.len(),
        targets: set.into_vec(),
        unresolved,
    })
}
