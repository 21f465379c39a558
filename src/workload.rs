//! Workload kinds and how each one is taken out of service
//!
//! Owner references are polymorphic: a Pod can be controlled by a ReplicaSet,
//! a StatefulSet, a Job, or a custom resource. The walker and executor only
//! need to know the kind's name and whether it can be scaled through
//! `spec.replicas`, so that is all [`WorkloadKind`] captures.

use std::fmt;

/// How a root controller is stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleStrategy {
    /// Patch `spec.replicas` to zero.
    Replicas,
    /// No replica count to patch. The target is skipped with a warning.
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    ReplicaSet,
    ReplicationController,
    DaemonSet,
    Job,
    CronJob,
    /// Any other owner kind, typically a custom resource.
    Other(String),
}

impl WorkloadKind {
    pub fn as_str(&self) -> &str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::ReplicationController => "ReplicationController",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
            WorkloadKind::Other(kind) => kind,
        }
    }

    pub fn scale_strategy(&self) -> ScaleStrategy {
        match self {
            WorkloadKind::Deployment
            | WorkloadKind::StatefulSet
            | WorkloadKind::ReplicaSet
            | WorkloadKind::ReplicationController => ScaleStrategy::Replicas,
            WorkloadKind::DaemonSet
            | WorkloadKind::Job
            | WorkloadKind::CronJob
            | WorkloadKind::Other(_) => ScaleStrategy::Unsupported,
        }
    }

    /// Strategy for an observed object. Custom kinds that expose
    /// `spec.replicas` scale like the built-in replica controllers.
    pub fn strategy_for(&self, replicas: Option<i32>) -> ScaleStrategy {
        match (self, replicas) {
            (WorkloadKind::Other(_), Some(_)) => ScaleStrategy::Replicas,
            _ => self.scale_strategy(),
        }
    }

    /// Reason shown when a target of this kind is skipped.
    pub fn unsupported_reason(&self) -> String {
        match self {
            WorkloadKind::DaemonSet => {
                "DaemonSet has no replica count; remove its node selector or delete it to release the claim"
                    .to_string()
            }
            WorkloadKind::Job | WorkloadKind::CronJob => format!(
                "{} runs to completion and cannot be scaled to zero; wait for it or delete it",
                self
            ),
            _ => format!("{} does not expose spec.replicas", self),
        }
    }
}

impl From<&str> for WorkloadKind {
    fn from(kind: &str) -> Self {
        match kind {
            "Deployment" => WorkloadKind::Deployment,
            "StatefulSet" => WorkloadKind::StatefulSet,
            "ReplicaSet" => WorkloadKind::ReplicaSet,
            "ReplicationController" => WorkloadKind::ReplicationController,
            "DaemonSet" => WorkloadKind::DaemonSet,
            "Job" => WorkloadKind::Job,
            "CronJob" => WorkloadKind::CronJob,
            other => WorkloadKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
