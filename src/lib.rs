pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod owner;
pub mod report;
pub mod resolver;
pub mod targets;
pub mod workload;

pub use api::{ClusterApi, KubeClusterApi, ObjectRef, OwnerObject};
pub use cli::Cli;
pub use config::{PodFilter, Scope, UnmountConfig};
pub use error::{Error, PodResolutionError, Result};
pub use executor::{Outcome, RunResult, execute};
pub use gate::{ExecutionMode, check_confirmation};
pub use owner::{MAX_OWNER_DEPTH, controller_of, resolve_root};
pub use report::Reporter;
pub use resolver::{BoundPod, PodScan, find_bound_pods};
pub use targets::{Target, TargetKey, TargetPlan, TargetSet, build_targets};
pub use workload::{ScaleStrategy, WorkloadKind};

use std::io::Write;

/// Find the bound Pods and resolve them into a plan, without acting on it.
///
/// Pods whose claim or owner could not be read are carried in
/// [`TargetPlan::unresolved`]; only listing Pods and a runaway owner chain are
/// fatal here.
pub async fn prepare<A, O, L>(
    api: &A,
    config: &UnmountConfig,
    reporter: &mut Reporter<O, L>,
) -> Result<TargetPlan>
where
    A: ClusterApi + ?Sized,
    O: Write,
    L: Write,
{
    config.validate()?;

    tracing::info!(
        "Looking for pods mounting {} in {}",
        config.filter.pvc_name.as_deref().unwrap_or("any PVC"),
        config.scope
    );

    let scan = find_bound_pods(api, &config.scope, &config.filter).await?;
    if scan.is_empty() {
        reporter.log_lossy("No pods found, nothing to do");
        return Ok(TargetPlan::default());
    }
    let pods_found = scan.bound.len() + scan.failures.len();
    reporter.log_lossy(format_args!("Found {} pods to scale down", pods_found));

    let mut plan = build_targets(api, &scan.bound).await?;
    let mut unresolved = scan.failures;
    unresolved.append(&mut plan.unresolved);
    plan.unresolved = unresolved;
    plan.pods_found = pods_found;
    reporter.log_lossy(format_args!(
        "Found {} controllers to scale down",
        plan.targets.len()
    ));

    Ok(plan)
}

/// Run one unmount pass: gate, resolve, execute, report.
///
/// The confirmation gate is checked before anything is read from the cluster,
/// so an unconfirmed real run fails fast and never mutates.
pub async fn run<A, O, L>(
    api: &A,
    config: &UnmountConfig,
    reporter: &mut Reporter<O, L>,
) -> Result<RunResult>
where
    A: ClusterApi + ?Sized,
    O: Write,
    L: Write,
{
    config.validate()?;
    let mode = check_confirmation(config.dry_run, config.confirmed)?;
    tracing::debug!("Execution mode: {:?}", mode);

    let plan = prepare(api, config, reporter).await?;
    if plan.is_empty() {
        return Ok(RunResult::empty(mode));
    }

    execute(api, &plan, mode, reporter).await
}
