use crate::{
    choco::PackageManager,
    config::Config,
    install::{self, InstallReport, InstallRequest},
    package::{self, Package},
    system::SystemProbe,
};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

const FILE_PREFIX: &str = "packages-";
const FILE_EXTENSION: &str = "json";

/// Never restored: choco cannot reinstall itself through itself.
const SELF_PACKAGE: &str = "chocolatey";

/// Snapshot of the installed packages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupFile {
    pub backup_date: DateTime<FixedOffset>,
    pub computer_name: String,
    pub chocolatey_version: String,
    pub package_count: usize,
    pub packages: Vec<Package>,
}

impl BackupFile {
    pub fn new(
        mut packages: Vec<Package>,
        computer_name: String,
        chocolatey_version: String,
        backup_date: DateTime<FixedOffset>,
    ) -> Self {
        package::sort_by_name(&mut packages);
        Self {
            backup_date,
            computer_name,
            chocolatey_version,
            package_count: packages.len(),
            packages,
        }
    }

    pub fn load(path: &Path) -> Result<BackupFile> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Could not open backup file {}", path.display()))?;
        let backup = serde_json::from_reader::<_, BackupFile>(std::io::BufReader::new(file))
            .with_context(|| format!("Could not parse backup file {}", path.display()))?;
        if backup.package_count != backup.packages.len() {
            tracing::warn!(
                "{} claims {} packages but lists {}",
                path.display(),
                backup.package_count,
                backup.packages.len()
            );
        }
        Ok(backup)
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create backup directory {}", parent.display()))?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Could not create backup file {}", path.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Could not save to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Could not write {}", path.display()))
    }

    pub fn file_name(&self) -> String {
        format!(
            "{FILE_PREFIX}{}.{FILE_EXTENSION}",
            self.backup_date.format("%Y%m%d-%H%M%S")
        )
    }

    /// Install requests for every package except choco itself.
    pub fn restore_requests(&self, exact_versions: bool) -> Vec<InstallRequest> {
        self.packages
            .iter()
            .filter(|p| !p.is_named(SELF_PACKAGE))
            .map(|p| {
                if exact_versions {
                    InstallRequest::exact(p)
                } else {
                    InstallRequest::latest(&p.name)
                }
            })
            .collect()
    }
}

impl std::fmt::Display for BackupFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Backup date:        {}", self.backup_date.to_rfc3339())?;
        writeln!(f, "Computer:           {}", self.computer_name)?;
        writeln!(f, "Chocolatey version: {}", self.chocolatey_version)?;
        writeln!(f, "Packages:           {}", self.packages.len())?;
        let width = self.packages.iter().map(|p| p.name.len()).max().unwrap_or(0);
        for p in &self.packages {
            write!(f, "\n  {:<width$}  {}", p.name, p.version)?;
        }
        Ok(())
    }
}

/// Backup files in `dir`, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Could not read {}", dir.display()));
        }
    };
    let mut backups: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_backup_file(p))
        .collect();
    // Timestamps in the names sort chronologically
    backups.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(backups)
}

fn is_backup_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == FILE_EXTENSION)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX))
}

pub fn newest_backup(dir: &Path) -> Result<PathBuf> {
    let Some(newest) = list_backups(dir)?.into_iter().next() else {
        bail!("No backups found in {}", dir.display())
    };
    Ok(newest)
}

/// Deletes all but the newest `keep` backups. `keep == 0` keeps everything.
pub fn prune(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let stale: Vec<PathBuf> = list_backups(dir)?.into_iter().skip(keep).collect();
    for path in &stale {
        std::fs::remove_file(path)
            .with_context(|| format!("Could not delete old backup {}", path.display()))?;
        tracing::info!("Deleted old backup {}", path.display());
    }
    Ok(stale)
}

/// Writes a snapshot of the installed packages and prunes old snapshots.
pub fn create(
    pm: &dyn PackageManager,
    probe: &dyn SystemProbe,
    config: &Config,
    now: DateTime<FixedOffset>,
) -> Result<(PathBuf, BackupFile)> {
    crate::preflight(pm, probe, false)?;

    let packages = pm.installed()?;
    let version = pm.version().unwrap_or_else(|e| {
        tracing::warn!("Could not read choco version: {e:#}");
        String::from("unknown")
    });
    let backup = BackupFile::new(packages, probe.computer_name(), version, now);
    let path = config.backup_path.join(backup.file_name());
    backup.store(&path)?;
    tracing::info!("Backed up {} packages to {}", backup.package_count, path.display());

    if let Err(e) = prune(&config.backup_path, config.backup_retention) {
        tracing::warn!("Could not prune old backups: {e:#}");
    }
    Ok((path, backup))
}

pub fn restore(
    pm: &dyn PackageManager,
    probe: &dyn SystemProbe,
    backup: &BackupFile,
    exact_versions: bool,
) -> Result<InstallReport> {
    tracing::info!(
        "Restoring {} packages from the backup of {} taken {}",
        backup.packages.len(),
        backup.computer_name,
        backup.backup_date.to_rfc3339()
    );
    install::run(pm, probe, &backup.restore_requests(exact_versions), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePackageManager, FakeProbe};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, day, hour, 30, 0)
            .unwrap()
    }

    fn sample() -> BackupFile {
        BackupFile::new(
            vec![
                Package::new("vlc", "3.0.20"),
                Package::new("chocolatey", "2.2.2"),
                Package::new("Git", "2.43.0"),
            ],
            String::from("TESTPC"),
            String::from("2.2.2"),
            at(5, 14),
        )
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backup = sample();
        let path = dir.path().join(backup.file_name());
        backup.store(&path).unwrap();
        assert_eq!(BackupFile::load(&path).unwrap(), backup);
    }

    #[test]
    fn store_leaves_complete_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backup = sample();
        let path = dir.path().join("nested").join(backup.file_name());
        backup.store(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_end().ends_with('}'));
        let parsed: BackupFile = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, backup);

        let blocked = dir.path().join("file-not-dir");
        std::fs::write(&blocked, "").unwrap();
        assert!(backup.store(&blocked.join("packages.json")).is_err());
    }

    #[test]
    fn json_uses_pascal_case_and_sorted_packages() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains(r#""BackupDate":"2024-03-05T14:30:00+01:00""#));
        assert!(json.contains(r#""PackageCount":3"#));
        assert!(json.contains(r#"{"Name":"chocolatey","Version":"2.2.2"},{"Name":"Git""#));
    }

    #[test]
    fn file_name_embeds_timestamp() {
        assert_eq!(sample().file_name(), "packages-20240305-143000.json");
    }

    #[test]
    fn unparsable_backup_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages-bad.json");
        std::fs::write(&path, "[1, 2").unwrap();
        let err = BackupFile::load(&path).unwrap_err();
        assert!(format!("{err}").contains("packages-bad.json"));
    }

    #[test]
    fn listing_is_newest_first_and_pruning_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for day in [3, 5, 4, 1] {
            let backup = BackupFile::new(Vec::new(), String::new(), String::new(), at(day, 8));
            backup.store(&dir.path().join(backup.file_name())).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let names = |paths: Vec<PathBuf>| -> Vec<String> {
            paths
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        };
        assert_eq!(
            names(list_backups(dir.path()).unwrap()),
            [
                "packages-20240305-083000.json",
                "packages-20240304-083000.json",
                "packages-20240303-083000.json",
                "packages-20240301-083000.json",
            ]
        );

        let removed = prune(dir.path(), 2).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(list_backups(dir.path()).unwrap().len(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert!(prune(dir.path(), 0).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_has_no_backups() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_backups(&dir.path().join("none")).unwrap().is_empty());
        assert!(newest_backup(&dir.path().join("none")).is_err());
    }

    #[test]
    fn create_writes_snapshot_of_installed_packages() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            backup_path: dir.path().to_path_buf(),
            backup_retention: 1,
            ..Config::default()
        };
        let pm = FakePackageManager::new().with_installed(&[("git", "2.43.0"), ("7zip", "23.1.0")]);
        let (path, backup) = create(&pm, &FakeProbe::default(), &config, at(5, 14)).unwrap();

        assert_eq!(backup.package_count, 2);
        assert_eq!(backup.computer_name, "TESTPC");
        assert_eq!(backup.chocolatey_version, "2.2.2");
        assert_eq!(newest_backup(dir.path()).unwrap(), path);

        create(&pm, &FakeProbe::default(), &config, at(6, 14)).unwrap();
        assert_eq!(list_backups(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn restore_skips_choco_and_installed_packages() {
        let pm = FakePackageManager::new().with_installed(&[("git", "2.43.0")]);
        let report = restore(&pm, &FakeProbe::default(), &sample(), true).unwrap();
        assert_eq!(report.installed, ["vlc"]);
        assert_eq!(report.skipped, ["Git"]);
        assert!(pm.calls().contains(&String::from("install vlc 3.0.20")));
        assert!(!pm.calls().iter().any(|c| c.contains("chocolatey")));
    }
}
