//! Output and progress streams
//!
//! The output stream gets one `<Kind>/<Namespace>/<Name>` line per affected
//! target and nothing else, so it can be piped into other tools. Progress
//! lines go to the log stream. The binary wires these to stdout and stderr.

use std::fmt::Display;
use std::io::Write;

use tracing::warn;

use crate::error::Result;
use crate::targets::Target;

pub struct Reporter<O, L> {
    out: O,
    log: L,
}

impl<O: Write, L: Write> Reporter<O, L> {
    pub fn new(out: O, log: L) -> Self {
        Self { out, log }
    }

    /// Record an affected target on the output stream.
    pub fn target(&mut self, target: &Target) -> Result<()> {
        writeln!(self.out, "{}", target)?;
        self.out.flush()?;
        Ok(())
    }

    /// Write a progress line to the log stream.
    pub fn log(&mut self, message: impl Display) -> Result<()> {
        writeln!(self.log, "{}", message)?;
        self.log.flush()?;
        Ok(())
    }

    /// Like [`Reporter::log`], but a failed write is only traced. Used once a
    /// run has started so a closed stream cannot stop it halfway.
    pub fn log_lossy(&mut self, message: impl Display) {
        if let Err(e) = self.log(message) {
            warn!("Failed to write progress line: {}", e);
        }
    }

    /// Like [`Reporter::target`], but a failed write is only traced.
    pub fn target_lossy(&mut self, target: &Target) {
        if let Err(e) = self.target(target) {
            warn!("Failed to write {} to output: {}", target, e);
        }
    }

    pub fn output(&self) -> &O {
        &self.out
    }

    pub fn log_stream(&self) -> &L {
        &self.log
    }

    pub fn into_inner(self) -> (O, L) {
        (self.out, self.log)
    }
}
