//! The gated auto-update workflow.
//!
//! Order of operations: prerequisites, network and power gates, outdated
//! listing, one upgrade per package, optional cleanup. Notifications are
//! sent by the caller from the returned [`UpdateReport`].

use crate::{
    Failure,
    choco::PackageManager,
    cleanup::{self, CleanupPaths, CleanupReport},
    config::Config,
    gate,
    system::SystemProbe,
};
use anyhow::Result;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateOptions {
    /// Skip the WiFi and power gates.
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Completed,
    UpToDate,
    DryRun,
    Skipped(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upgraded {
    pub name: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug)]
pub struct UpdateReport {
    pub outcome: UpdateOutcome,
    pub upgraded: Vec<Upgraded>,
    /// Pinned or excluded packages that were left alone.
    pub held: Vec<String>,
    pub planned: Vec<String>,
    pub failed: Vec<Failure>,
    pub reboot_required: bool,
    pub cleanup: Option<CleanupReport>,
    dry_run: bool,
}

impl UpdateReport {
    fn new(outcome: UpdateOutcome, dry_run: bool) -> Self {
        Self {
            outcome,
            upgraded: Vec::new(),
            held: Vec::new(),
            planned: Vec::new(),
            failed: Vec::new(),
            reboot_required: false,
            cleanup: None,
            dry_run,
        }
    }

    /// Dry runs never notify, whatever the outcome.
    pub fn should_notify(&self) -> bool {
        !self.dry_run
    }

    pub fn issue_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether anything happened that is worth an email.
    pub fn has_changes(&self) -> bool {
        !self.upgraded.is_empty() || !self.failed.is_empty()
    }

    /// One-line summary used for notifications and the log.
    pub fn summary(&self) -> String {
        match &self.outcome {
            UpdateOutcome::Skipped(reason) => format!("Update skipped: {reason}"),
            UpdateOutcome::UpToDate => String::from("All packages are up to date"),
            UpdateOutcome::DryRun => format!("{} package(s) would be upgraded", self.planned.len()),
            UpdateOutcome::Completed => {
                let mut s = format!(
                    "{} package(s) upgraded, {} failed",
                    self.upgraded.len(),
                    self.failed.len()
                );
                if self.reboot_required {
                    s.push_str(", reboot required");
                }
                s
            }
        }
    }
}

impl std::fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for u in &self.upgraded {
            writeln!(f, "  upgraded  {} {} -> {}", u.name, u.from, u.to)?;
        }
        for name in &self.planned {
            writeln!(f, "  would upgrade  {name}")?;
        }
        for name in &self.held {
            writeln!(f, "  held      {name}")?;
        }
        for failure in &self.failed {
            writeln!(f, "  FAILED    {failure}")?;
        }
        write!(f, "{}", self.summary())
    }
}

pub fn run(
    pm: &dyn PackageManager,
    probe: &dyn SystemProbe,
    config: &Config,
    cleanup_paths: &CleanupPaths,
    options: UpdateOptions,
    sleep: impl FnMut(Duration),
) -> Result<UpdateReport> {
    crate::preflight(pm, probe, !options.dry_run)?;

    if options.force {
        tracing::info!("Skipping network and power checks (--force)");
    } else {
        let decision = gate::evaluate(probe, config, sleep);
        if let Some(reason) = decision.reason() {
            tracing::warn!("Update skipped: {reason}");
            return Ok(UpdateReport::new(
                UpdateOutcome::Skipped(reason.to_string()),
                options.dry_run,
            ));
        }
    }

    let outdated = pm.outdated()?;
    let mut report = UpdateReport::new(UpdateOutcome::Completed, options.dry_run);
    let mut candidates = Vec::new();
    for package in outdated {
        if package.pinned || config.is_excluded(&package.name) {
            tracing::info!("Holding {} at {}", package.name, package.current);
            report.held.push(package.name);
        } else {
            candidates.push(package);
        }
    }

    if candidates.is_empty() {
        tracing::info!("No packages to upgrade");
        report.outcome = UpdateOutcome::UpToDate;
    } else if options.dry_run {
        report.outcome = UpdateOutcome::DryRun;
        report.planned = candidates.into_iter().map(|p| p.name).collect();
        return Ok(report);
    }

    for package in candidates {
        tracing::info!("Upgrading {} {} -> {}", package.name, package.current, package.available);
        match pm.upgrade(&package.name) {
            Ok(out) if out.succeeded() => {
                report.reboot_required |= out.reboot_required();
                report.upgraded.push(Upgraded {
                    name: package.name,
                    from: package.current,
                    to: package.available,
                });
            }
            Ok(out) => {
                let failure = Failure::from_outcome(&package.name, &out);
                tracing::error!("Upgrade failed: {failure}");
                report.failed.push(failure);
            }
            Err(e) => {
                tracing::error!("Upgrade of {} failed: {e:#}", package.name);
                report.failed.push(Failure::new(&package.name, None, format!("{e:#}")));
            }
        }
    }

    if config.cleanup_after_update && !options.dry_run {
        report.cleanup = Some(cleanup::run(pm, cleanup_paths, config, false));
    }

    tracing::info!("{}", report.summary());
    Ok(report)
}
