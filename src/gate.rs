//! Confirmation gate: nothing is mutated unless the run is real and confirmed

use crate::error::{Error, Result};

/// What the executor is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Report targets only.
    DryRun,
    /// Scale down controllers and delete bare Pods.
    Apply,
}

/// Decide the execution mode.
///
/// A dry run never mutates, whatever `confirmed` says. A real run without
/// confirmation is an error rather than a silent no-op.
pub fn check_confirmation(dry_run: bool, confirmed: bool) -> Result<ExecutionMode> {
    match (dry_run, confirmed) {
        (true, _) => Ok(ExecutionMode::DryRun),
        (false, true) => Ok(ExecutionMode::Apply),
        (false, false) => Err(Error::ConfirmationRequired),
    }
}
