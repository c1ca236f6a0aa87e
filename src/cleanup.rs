use crate::{choco::PackageManager, config::Config};
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// Directories the cleanup works on.
#[derive(Clone, Debug, Default)]
pub struct CleanupPaths {
    /// `%TEMP%\chocolatey`
    pub choco_temp: Option<PathBuf>,
    /// `%ChocolateyInstall%`
    pub install_dir: Option<PathBuf>,
}

impl CleanupPaths {
    pub fn discover(pm: &dyn PackageManager) -> Self {
        Self {
            choco_temp: Some(std::env::temp_dir().join("chocolatey")),
            install_dir: pm.install_dir(),
        }
    }
}

#[derive(Debug, Default)]
pub struct StepResult {
    pub name: &'static str,
    pub freed_bytes: u64,
    pub removed: usize,
    pub errors: Vec<String>,
}

impl StepResult {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub steps: Vec<StepResult>,
    pub dry_run: bool,
}

impl CleanupReport {
    pub fn freed_bytes(&self) -> u64 {
        self.steps.iter().map(|s| s.freed_bytes).sum()
    }

    pub fn issue_count(&self) -> usize {
        self.steps.iter().filter(|s| s.failed()).count()
    }
}

impl std::fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in &self.steps {
            let status = if step.failed() { "FAILED" } else { "ok" };
            writeln!(
                f,
                "  {:<12} {:>6}  {} items, {}",
                step.name,
                status,
                step.removed,
                format_bytes(step.freed_bytes)
            )?;
            for error in &step.errors {
                writeln!(f, "      {error}")?;
            }
        }
        let verb = if self.dry_run { "Would free" } else { "Freed" };
        write!(f, "{verb} {}", format_bytes(self.freed_bytes()))
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

pub fn run(pm: &dyn PackageManager, paths: &CleanupPaths, config: &Config, dry_run: bool) -> CleanupReport {
    let mut report = CleanupReport {
        steps: Vec::new(),
        dry_run,
    };

    let mut cache = StepResult::new("choco cache");
    if !dry_run {
        match pm.clear_cache() {
            Ok(out) if out.succeeded() => {}
            Ok(out) => cache.errors.push(format!(
                "'choco cache remove' exited with code {}: {}",
                out.code,
                out.summary().unwrap_or("<no output>")
            )),
            Err(e) => cache.errors.push(format!("{e:#}")),
        }
    }
    report.steps.push(cache);

    let mut temp = StepResult::new("temp files");
    if let Some(dir) = &paths.choco_temp {
        clear_dir_contents(dir, dry_run, &mut temp);
    }
    report.steps.push(temp);

    let install_dir = paths.install_dir.as_deref();
    for (name, sub) in [("lib-bad", "lib-bad"), ("lib-bkp", "lib-bkp")] {
        let mut step = StepResult::new(name);
        if let Some(dir) = install_dir {
            remove_path(&dir.join(sub), dry_run, &mut step);
        }
        report.steps.push(step);
    }

    let mut logs = StepResult::new("old logs");
    if let Some(dir) = install_dir {
        let max_age = Duration::from_secs(config.log_retention_days.saturating_mul(SECS_PER_DAY));
        remove_old_files(&dir.join("logs"), "log", max_age, SystemTime::now(), dry_run, &mut logs);
    }
    report.steps.push(logs);

    for step in report.steps.iter().filter(|s| s.failed()) {
        tracing::warn!("Cleanup step '{}' had {} error(s)", step.name, step.errors.len());
    }
    tracing::info!(
        "Cleanup finished, {} {}",
        if dry_run { "would free" } else { "freed" },
        format_bytes(report.freed_bytes())
    );
    report
}

pub fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .flatten()
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

fn clear_dir_contents(dir: &Path, dry_run: bool, step: &mut StepResult) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            step.errors.push(format!("Could not read {}: {e}", dir.display()));
            return;
        }
    };
    for entry in entries.flatten() {
        remove_path(&entry.path(), dry_run, step);
    }
}

fn remove_path(path: &Path, dry_run: bool, step: &mut StepResult) {
    let Ok(metadata) = std::fs::symlink_metadata(path) else {
        return;
    };
    let size = dir_size(path);
    if !dry_run {
        let res = if metadata.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        if let Err(e) = res {
            step.errors.push(format!("Could not remove {}: {e}", path.display()));
            return;
        }
    }
    tracing::debug!("Removed {} ({})", path.display(), format_bytes(size));
    step.freed_bytes += size;
    step.removed += 1;
}

fn remove_old_files(
    dir: &Path,
    extension: &str,
    max_age: Duration,
    now: SystemTime,
    dry_run: bool,
    step: &mut StepResult,
) {
    if !dir.is_dir() {
        return;
    }
    let Some(cutoff) = now.checked_sub(max_age) else {
        return;
    };
    let old_files = walkdir::WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext.eq_ignore_ascii_case(extension)))
        .filter(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .is_some_and(|modified| modified < cutoff)
        })
        .map(|e| e.into_path())
        .collect::<Vec<_>>();
    for path in old_files {
        remove_path(&path, dry_run, step);
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{value:.1} {unit}")
}
