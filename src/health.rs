use crate::{
    GIB,
    backup::{self, BackupFile},
    choco::PackageManager,
    config::Config,
    system::SystemProbe,
};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Warn,
    Issue,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Status::Ok => "OK",
            Status::Warn => "WARN",
            Status::Issue => "ISSUE",
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Check {
    pub name: &'static str,
    pub status: Status,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, status: Status, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthReport {
    pub checks: Vec<Check>,
}

impl HealthReport {
    pub fn issue_count(&self) -> usize {
        self.count(Status::Issue)
    }

    pub fn count(&self, status: Status) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    pub fn get(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for check in &self.checks {
            writeln!(f, "[{:^7}] {}: {}", check.status, check.name, check.detail)?;
        }
        write!(
            f,
            "{} issue(s), {} warning(s)",
            self.issue_count(),
            self.count(Status::Warn)
        )
    }
}

pub fn run(
    pm: &dyn PackageManager,
    probe: &dyn SystemProbe,
    config: &Config,
    now: DateTime<FixedOffset>,
) -> HealthReport {
    let mut checks = vec![elevation(probe)];

    match pm.version() {
        Ok(version) => {
            checks.push(Check::new("Chocolatey", Status::Ok, format!("v{version}")));
            checks.push(outdated(pm));
            checks.push(failed_installs(pm));
        }
        Err(e) => checks.push(Check::new(
            "Chocolatey",
            Status::Issue,
            format!("not installed or not working: {e:#}"),
        )),
    }

    checks.push(disk_space(probe, config));
    checks.push(backups(config, now));
    checks.push(reboot(probe));

    for check in checks.iter().filter(|c| c.status != Status::Ok) {
        tracing::warn!("{} {}: {}", check.status, check.name, check.detail);
    }
    HealthReport { checks }
}

fn elevation(probe: &dyn SystemProbe) -> Check {
    match probe.is_elevated() {
        Ok(true) => Check::new("Administrator", Status::Ok, "running elevated"),
        Ok(false) => Check::new("Administrator", Status::Warn, "not elevated, some checks may be incomplete"),
        Err(e) => Check::new("Administrator", Status::Warn, format!("could not check: {e:#}")),
    }
}

fn outdated(pm: &dyn PackageManager) -> Check {
    match pm.outdated() {
        Ok(outdated) if outdated.is_empty() => Check::new("Outdated packages", Status::Ok, "none"),
        Ok(outdated) => {
            let names: Vec<&str> = outdated.iter().map(|p| p.name.as_str()).collect();
            Check::new(
                "Outdated packages",
                Status::Warn,
                format!("{}: {}", names.len(), names.join(", ")),
            )
        }
        Err(e) => Check::new("Outdated packages", Status::Issue, format!("{e:#}")),
    }
}

fn failed_installs(pm: &dyn PackageManager) -> Check {
    let Some(lib_bad) = pm.install_dir().map(|d| d.join("lib-bad")) else {
        return Check::new("Failed installs", Status::Ok, "install directory unknown");
    };
    let names: Vec<String> = std::fs::read_dir(&lib_bad)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        Check::new("Failed installs", Status::Ok, "none")
    } else {
        Check::new(
            "Failed installs",
            Status::Issue,
            format!("{} in {}: {}", names.len(), lib_bad.display(), names.join(", ")),
        )
    }
}

fn disk_space(probe: &dyn SystemProbe, config: &Config) -> Check {
    match probe.free_disk_bytes() {
        Ok(free) => {
            // Rounded down, never above the compared value.
            let free_gb = (free as f64 / GIB as f64 * 10.0).floor() / 10.0;
            let detail = format!("{free_gb:.1} GB free, minimum {} GB", config.min_free_disk_gb);
            if free < config.min_free_disk_gb.saturating_mul(GIB) {
                Check::new("Disk space", Status::Issue, detail)
            } else {
                Check::new("Disk space", Status::Ok, detail)
            }
        }
        Err(e) => Check::new("Disk space", Status::Warn, format!("could not check: {e:#}")),
    }
}

fn backups(config: &Config, now: DateTime<FixedOffset>) -> Check {
    let newest = backup::newest_backup(&config.backup_path).and_then(|p| BackupFile::load(&p));
    match newest {
        Ok(newest) => {
            let age = now.signed_duration_since(newest.backup_date).num_days();
            let detail = format!(
                "newest from {} ({age} day(s) old)",
                newest.backup_date.format("%Y-%m-%d %H:%M")
            );
            if age > config.max_backup_age_days {
                Check::new("Backups", Status::Warn, detail)
            } else {
                Check::new("Backups", Status::Ok, detail)
            }
        }
        Err(e) => Check::new("Backups", Status::Warn, format!("{e:#}")),
    }
}

fn reboot(probe: &dyn SystemProbe) -> Check {
    match probe.reboot_pending() {
        Ok(false) => Check::new("Pending reboot", Status::Ok, "none"),
        Ok(true) => Check::new("Pending reboot", Status::Warn, "a reboot is pending"),
        Err(e) => Check::new("Pending reboot", Status::Warn, format!("could not check: {e:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        package::Package,
        testing::{FakePackageManager, FakeProbe},
    };
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 20, 12, 0, 0)
            .unwrap()
    }

    fn config_with_backup(dir: &std::path::Path, days_old: i64) -> Config {
        let date = now() - chrono::Duration::days(days_old);
        let backup = BackupFile::new(
            vec![Package::new("git", "2.43.0")],
            String::from("TESTPC"),
            String::from("2.2.2"),
            date,
        );
        backup.store(&dir.join(backup.file_name())).unwrap();
        Config {
            backup_path: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn healthy_machine_has_no_issues() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_backup(dir.path(), 1);
        let report = run(&FakePackageManager::new(), &FakeProbe::default(), &config, now());
        assert_eq!(report.issue_count(), 0);
        assert_eq!(report.count(Status::Warn), 0);
        assert_eq!(crate::exit_code(report.issue_count()), 0);
    }

    #[test]
    fn warnings_do_not_count_as_issues() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_backup(dir.path(), 30);
        let pm = FakePackageManager::new().with_outdated(&[("git", "2.42.0", "2.43.0", false)]);
        let probe = FakeProbe {
            reboot_pending: true,
            elevated: false,
            ..FakeProbe::default()
        };
        let report = run(&pm, &probe, &config, now());
        assert_eq!(report.issue_count(), 0);
        assert_eq!(report.count(Status::Warn), 4);
        assert_eq!(report.get("Backups").unwrap().status, Status::Warn);
        assert_eq!(report.get("Outdated packages").unwrap().detail, "1: git");
    }

    #[test]
    fn disk_space_shows_fractional_gigabytes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_backup(dir.path(), 0);
        let probe = FakeProbe {
            free_bytes: 10 * GIB - GIB / 100,
            ..FakeProbe::default()
        };
        let report = run(&FakePackageManager::new(), &probe, &config, now());
        let disk = report.get("Disk space").unwrap();
        assert_eq!(disk.status, Status::Issue);
        assert_eq!(disk.detail, "9.9 GB free, minimum 10 GB");

        let probe = FakeProbe {
            free_bytes: 10 * GIB,
            ..FakeProbe::default()
        };
        let report = run(&FakePackageManager::new(), &probe, &config, now());
        assert_eq!(report.get("Disk space").unwrap().status, Status::Ok);
    }

    #[test]
    fn missing_choco_and_low_disk_are_issues() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_backup(dir.path(), 0);
        let probe = FakeProbe {
            free_bytes: 2 * GIB,
            ..FakeProbe::default()
        };
        let report = run(&FakePackageManager::default(), &probe, &config, now());
        assert_eq!(report.issue_count(), 2);
        assert!(report.get("Outdated packages").is_none());
        assert_eq!(crate::exit_code(report.issue_count()), 1);
    }

    #[test]
    fn lib_bad_entries_are_issues() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_backup(dir.path(), 0);
        let install = dir.path().join("choco");
        std::fs::create_dir_all(install.join("lib-bad/brokenpkg")).unwrap();
        let pm = FakePackageManager {
            install_dir: Some(install),
            ..FakePackageManager::new()
        };
        let report = run(&pm, &FakeProbe::default(), &config, now());
        let check = report.get("Failed installs").unwrap();
        assert_eq!(check.status, Status::Issue);
        assert!(check.detail.ends_with("brokenpkg"));
    }

    #[test]
    fn no_backup_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            backup_path: dir.path().join("none"),
            ..Config::default()
        };
        let report = run(&FakePackageManager::new(), &FakeProbe::default(), &config, now());
        assert_eq!(report.get("Backups").unwrap().status, Status::Warn);
    }

    #[test]
    fn json_output_uses_status_names() {
        let report = HealthReport {
            checks: vec![Check::new("Disk space", Status::Issue, "1 GB free")],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"{"Checks":[{"Name":"Disk space","Status":"ISSUE","Detail":"1 GB free"}]}"#
        );
    }
}
