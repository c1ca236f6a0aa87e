pub mod backup;
pub mod choco;
pub mod cleanup;
pub mod config;
pub mod gate;
pub mod health;
pub mod install;
pub mod logging;
pub mod notify;
pub mod package;
pub mod schedule;
pub mod system;
pub mod update;

#[cfg(test)]
mod testing;

use anyhow::{Result, bail};
use choco::{CommandOutcome, PackageManager};
use system::SystemProbe;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// A package (or task) operation that did not succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub name: String,
    pub code: Option<i32>,
    pub message: String,
}

impl Failure {
    pub fn new(name: &str, code: Option<i32>, message: String) -> Self {
        Self {
            name: name.to_string(),
            code,
            message,
        }
    }

    pub fn from_outcome(name: &str, out: &CommandOutcome) -> Self {
        Self::new(
            name,
            Some(out.code),
            out.summary().unwrap_or("<no output>").to_string(),
        )
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (exit code {code}): {}", self.name, self.message),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

/// Checks the prerequisites every modifying operation needs.
pub fn preflight(pm: &dyn PackageManager, probe: &dyn SystemProbe, needs_admin: bool) -> Result<()> {
    if needs_admin && !probe.is_elevated()? {
        bail!("This operation must be run as Administrator")
    }
    if !pm.is_available() {
        bail!("Chocolatey is not installed or 'choco' is not on PATH")
    }
    Ok(())
}

/// Process exit code for a run that found `issues` problems.
pub fn exit_code(issues: usize) -> u8 {
    if issues == 0 { 0 } else { 1 }
}
