use crate::{
    Failure,
    choco::PackageManager,
    package::{self, Package},
    system::SystemProbe,
};
use anyhow::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallRequest {
    pub name: String,
    /// Pin the install to this version instead of the latest.
    pub version: Option<String>,
}

impl InstallRequest {
    pub fn latest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn exact(package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            version: Some(package.version.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<String>,
    /// Already present, left untouched.
    pub skipped: Vec<String>,
    /// Would be installed; only filled on dry runs.
    pub planned: Vec<String>,
    pub failed: Vec<Failure>,
    pub reboot_required: bool,
}

impl InstallReport {
    pub fn issue_count(&self) -> usize {
        self.failed.len()
    }
}

impl std::fmt::Display for InstallReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for name in &self.installed {
            writeln!(f, "  installed  {name}")?;
        }
        for name in &self.planned {
            writeln!(f, "  would install  {name}")?;
        }
        for name in &self.skipped {
            writeln!(f, "  skipped    {name} (already installed)")?;
        }
        for failure in &self.failed {
            writeln!(f, "  FAILED     {failure}")?;
        }
        write!(
            f,
            "{} installed, {} skipped, {} failed",
            self.installed.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        if self.reboot_required {
            write!(f, " (reboot required)")?;
        }
        Ok(())
    }
}

/// Installs every requested package that is not installed yet.
pub fn run(
    pm: &dyn PackageManager,
    probe: &dyn SystemProbe,
    requests: &[InstallRequest],
    dry_run: bool,
) -> Result<InstallReport> {
    crate::preflight(pm, probe, !dry_run)?;

    let installed = pm.installed()?;
    let mut report = InstallReport::default();
    let mut seen: Vec<&str> = Vec::new();

    for request in requests {
        let name = request.name.as_str();
        if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            continue;
        }
        seen.push(name);

        if package::contains(&installed, name) {
            tracing::info!("{name} is already installed, skipping");
            report.skipped.push(name.to_string());
            continue;
        }
        if dry_run {
            report.planned.push(name.to_string());
            continue;
        }

        tracing::info!("Installing {name}");
        match pm.install(name, request.version.as_deref()) {
            Ok(out) if out.succeeded() => {
                report.reboot_required |= out.reboot_required();
                report.installed.push(name.to_string());
            }
            Ok(out) => {
                let failure = Failure::from_outcome(name, &out);
                tracing::error!("Install failed: {failure}");
                report.failed.push(failure);
            }
            Err(e) => {
                tracing::error!("Install of {name} failed: {e:#}");
                report.failed.push(Failure::new(name, None, format!("{e:#}")));
            }
        }
    }

    Ok(report)
}
