//! Scale-down executor
//!
//! Targets are processed one at a time, in order. A failure on one target is
//! recorded and the rest are still attempted. Stream write errors are logged
//! and never stop the loop.

use std::fmt;
use std::io::Write;

use tracing::{info, warn};

use crate::api::ClusterApi;
use crate::error::{Error, Result};
use crate::gate::ExecutionMode;
use crate::report::Reporter;
use crate::targets::{Target, TargetPlan};
use crate::workload::ScaleStrategy;

/// What happened to one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Dry run: listed, not touched.
    Reported,
    /// `spec.replicas` was set to zero.
    ScaledDown { previous_replicas: Option<i32> },
    /// Bare Pod deleted.
    Deleted,
    /// Nothing this tool can do for the kind; left for the operator.
    Skipped(String),
    Failed(String),
}

impl Outcome {
    /// Whether the target belongs on the output stream.
    pub fn is_affected(&self) -> bool {
        matches!(
            self,
            Outcome::Reported | Outcome::ScaledDown { .. } | Outcome::Deleted
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Reported => f.write_str("reported"),
            Outcome::ScaledDown { .. } => f.write_str("scaled down"),
            Outcome::Deleted => f.write_str("deleted"),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Ordered (target, outcome) pairs for one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub mode: ExecutionMode,
    entries: Vec<(Target, Outcome)>,
}

impl RunResult {
    pub fn empty(mode: ExecutionMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[(Target, Outcome)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &(Target, Outcome)> {
        self.entries.iter().filter(|(_, outcome)| outcome.is_failed())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &(Target, Outcome)> {
        self.entries
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Outcome::Skipped(_)))
    }

    /// Whether anything was scaled down or deleted.
    pub fn any_applied(&self) -> bool {
        self.entries.iter().any(|(_, outcome)| {
            matches!(outcome, Outcome::ScaledDown { .. } | Outcome::Deleted)
        })
    }

    pub fn all_failed(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, o)| o.is_failed())
    }

    /// `<Kind>/<Namespace>/<Name>` of every affected target, in order.
    pub fn identifiers(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, outcome)| outcome.is_affected())
            .map(|(target, _)| target.to_string())
            .collect()
    }
}

/// Dry run: describe what would happen to a target.
fn describe<O: Write, L: Write>(target: &Target, reporter: &mut Reporter<O, L>) -> Outcome {
    match target {
        Target::Pod { .. } => {
            reporter.log_lossy(format_args!("Dry run, would delete {}", target));
        }
        Target::Controller {
            reference,
            replicas,
            missing,
        } => {
            let replicas = replicas.map_or_else(|| "unknown".to_string(), |r| r.to_string());
            if *missing {
                reporter.log_lossy(format_args!(
                    "Dry run, would scale down {} (owner not found)",
                    target
                ));
            } else if target.scale_strategy() == Some(ScaleStrategy::Unsupported) {
                reporter.log_lossy(format_args!(
                    "Dry run, would skip {}: {}",
                    target,
                    reference.kind.unsupported_reason()
                ));
            } else {
                reporter.log_lossy(format_args!(
                    "Dry run, would scale down {} (replicas: {})",
                    target, replicas
                ));
            }
        }
    }
    Outcome::Reported
}

/// Real run: act on a single target.
async fn apply<A>(api: &A, target: &Target) -> Outcome
where
    A: ClusterApi + ?Sized,
{
    match target {
        Target::Pod { namespace, name } => match api.delete_pod(namespace, name).await {
            Ok(()) => Outcome::Deleted,
            Err(e) => Outcome::Failed(e.to_string()),
        },
        Target::Controller { missing: true, .. } => {
            Outcome::Failed("owner no longer exists".to_string())
        }
        Target::Controller {
            reference,
            replicas,
            missing: false,
        } => match reference.kind.strategy_for(*replicas) {
            ScaleStrategy::Unsupported => Outcome::Skipped(reference.kind.unsupported_reason()),
            ScaleStrategy::Replicas => match api.patch_replicas(reference, 0).await {
                Ok(()) => Outcome::ScaledDown {
                    previous_replicas: *replicas,
                },
                Err(e) => Outcome::Failed(e.to_string()),
            },
        },
    }
}

fn report_applied<O: Write, L: Write>(
    reporter: &mut Reporter<O, L>,
    target: &Target,
    outcome: &Outcome,
) {
    match outcome {
        Outcome::ScaledDown { previous_replicas } => {
            info!("Scaled down {} from {:?} replicas", target, previous_replicas);
            reporter.log_lossy(format_args!("Scaled down {}", target));
        }
        Outcome::Deleted => {
            info!("Deleted {}", target);
            reporter.log_lossy(format_args!("Deleted {}", target));
        }
        Outcome::Skipped(reason) => {
            warn!("Skipped {}: {}", target, reason);
            reporter.log_lossy(format_args!("Skipped {}: {}", target, reason));
        }
        Outcome::Failed(reason) => {
            let action = match target {
                Target::Pod { .. } => "delete",
                Target::Controller { .. } => "scale down",
            };
            warn!("Failed to {} {}: {}", action, target, reason);
            reporter.log_lossy(format_args!("Failed to {} {}: {}", action, target, reason));
        }
        Outcome::Reported => {}
    }
}

/// Process a plan: every unresolved Pod is recorded as failed, then every
/// target is handled in order.
///
/// A real run returns an error when it had entries but scaled down or deleted
/// nothing: [`Error::AllTargetsFailed`] if every entry failed, otherwise
/// [`Error::NothingScaled`]. Partial failures are visible through
/// [`RunResult::failed`].
pub async fn execute<A, O, L>(
    api: &A,
    plan: &TargetPlan,
    mode: ExecutionMode,
    reporter: &mut Reporter<O, L>,
) -> Result<RunResult>
where
    A: ClusterApi + ?Sized,
    O: Write,
    L: Write,
{
    let mut result = RunResult::empty(mode);

    for failure in &plan.unresolved {
        warn!("Failed to resolve {}", failure);
        result.entries.push((
            Target::pod(failure.namespace.as_str(), failure.name.as_str()),
            Outcome::Failed(failure.source.to_string()),
        ));
        reporter.log_lossy(format_args!("Failed to resolve {}", failure));
    }

    for target in &plan.targets {
        let outcome = match mode {
            ExecutionMode::DryRun => describe(target, reporter),
            ExecutionMode::Apply => apply(api, target).await,
        };
        result.entries.push((target.clone(), outcome.clone()));

        if mode == ExecutionMode::Apply {
            report_applied(reporter, target, &outcome);
        }
        if outcome.is_affected() {
            reporter.target_lossy(target);
        }
    }

    if result.all_failed() {
        return Err(Error::AllTargetsFailed {
            count: result.len(),
        });
    }

    match mode {
        ExecutionMode::DryRun => reporter.log_lossy("Dry run complete, no changes made"),
        ExecutionMode::Apply => {
            if !result.is_empty() && !result.any_applied() {
                return Err(Error::NothingScaled {
                    skipped: result.skipped().count(),
                    failed: result.failed().count(),
                });
            }
            let failures = result.failed().count();
            if failures == 0 {
                reporter.log_lossy("Scale down complete");
            } else {
                reporter.log_lossy(format_args!(
                    "Scale down complete, {} of {} targets failed",
                    failures,
                    result.len()
                ));
            }
        }
    }

    Ok(result)
}
