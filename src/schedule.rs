use crate::{Failure, choco::CommandOutcome, config::Schedule};
use anyhow::{Context, Result, bail};
use std::{path::Path, process::Command};

pub const TASK_FOLDER: &str = r"\chocomaint\";
const DAYS: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    pub subcommand: &'static str,
    pub day: String,
    pub time: String,
}

impl TaskDefinition {
    fn new(label: &str, subcommand: &'static str, day: &str, time: &str) -> Self {
        Self {
            name: task_name(label),
            subcommand,
            day: day.to_ascii_uppercase(),
            time: time.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !DAYS.contains(&self.day.as_str()) {
            bail!("Invalid day {:?} for task {}, expected one of {}", self.day, self.name, DAYS.join(", "))
        }
        let valid_time = self
            .time
            .split_once(':')
            .and_then(|(h, m)| Some((h.parse::<u8>().ok()?, m.parse::<u8>().ok()?)))
            .is_some_and(|(h, m)| self.time.len() == 5 && h < 24 && m < 60);
        if !valid_time {
            bail!("Invalid time {:?} for task {}, expected HH:MM", self.time, self.name)
        }
        Ok(())
    }
}

fn task_name(label: &str) -> String {
    format!("{TASK_FOLDER}{label}")
}

/// Every task this tool manages, enabled or not.
pub fn all_tasks(schedule: &Schedule) -> Vec<(bool, TaskDefinition)> {
    vec![
        (
            schedule.update_enabled,
            TaskDefinition::new("Update", "update", &schedule.update_day, &schedule.update_time),
        ),
        (
            schedule.cleanup_enabled,
            TaskDefinition::new("Cleanup", "cleanup", &schedule.cleanup_day, &schedule.cleanup_time),
        ),
        (
            schedule.backup_enabled,
            TaskDefinition::new("Backup", "backup", &schedule.backup_day, &schedule.backup_time),
        ),
    ]
}

pub fn create_args(task: &TaskDefinition, exe: &Path, config_path: &Path) -> Vec<String> {
    let command = format!(
        "\"{}\" --config \"{}\" {}",
        exe.display(),
        config_path.display(),
        task.subcommand
    );
    [
        "/Create",
        "/TN",
        task.name.as_str(),
        "/TR",
        command.as_str(),
        "/SC",
        "WEEKLY",
        "/D",
        task.day.as_str(),
        "/ST",
        task.time.as_str(),
        "/RU",
        "SYSTEM",
        "/RL",
        "HIGHEST",
        "/F",
    ]
    .map(String::from)
    .to_vec()
}

pub fn delete_args(name: &str) -> Vec<String> {
    ["/Delete", "/TN", name, "/F"].map(String::from).to_vec()
}

pub fn query_args(name: &str) -> Vec<String> {
    ["/Query", "/TN", name].map(String::from).to_vec()
}

/// Runs `schtasks.exe` with the given arguments.
pub fn schtasks(args: &[String]) -> Result<CommandOutcome> {
    tracing::debug!("Running schtasks {}", args.join(" "));
    let out = Command::new("schtasks.exe")
        .args(args)
        .output()
        .context("Failed to execute schtasks.exe")?;
    Ok(CommandOutcome {
        code: out.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    })
}

#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub changed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<Failure>,
}

impl ScheduleReport {
    pub fn issue_count(&self) -> usize {
        self.failed.len()
    }
}

impl std::fmt::Display for ScheduleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for name in &self.changed {
            writeln!(f, "  ok       {name}")?;
        }
        for name in &self.skipped {
            writeln!(f, "  skipped  {name} (not registered)")?;
        }
        for failure in &self.failed {
            writeln!(f, "  FAILED   {failure}")?;
        }
        write!(f, "{} changed, {} failed", self.changed.len(), self.failed.len())
    }
}

fn record(report: &mut ScheduleReport, name: &str, res: Result<CommandOutcome>) {
    match res {
        Ok(out) if out.code == 0 => report.changed.push(name.to_string()),
        Ok(out) => report.failed.push(Failure::from_outcome(name, &out)),
        Err(e) => report.failed.push(Failure::new(name, None, format!("{e:#}"))),
    }
}

/// Creates or replaces the enabled tasks. Disabled tasks are removed.
pub fn install(
    schedule: &Schedule,
    exe: &Path,
    config_path: &Path,
    mut run: impl FnMut(&[String]) -> Result<CommandOutcome>,
) -> ScheduleReport {
    let mut report = ScheduleReport::default();
    for (enabled, task) in all_tasks(schedule) {
        if !enabled {
            if exists(&task.name, &mut run) {
                tracing::info!("Removing disabled task {}", task.name);
                let res = run(&delete_args(&task.name));
                record(&mut report, &task.name, res);
            } else {
                report.skipped.push(task.name);
            }
            continue;
        }
        if let Err(e) = task.validate() {
            tracing::error!("{e:#}");
            report.failed.push(Failure::new(&task.name, None, format!("{e:#}")));
            continue;
        }
        tracing::info!("Scheduling {} weekly on {} at {}", task.name, task.day, task.time);
        let res = run(&create_args(&task, exe, config_path));
        record(&mut report, &task.name, res);
    }
    report
}

pub fn remove(
    schedule: &Schedule,
    mut run: impl FnMut(&[String]) -> Result<CommandOutcome>,
) -> ScheduleReport {
    let mut report = ScheduleReport::default();
    for (_, task) in all_tasks(schedule) {
        if !exists(&task.name, &mut run) {
            report.skipped.push(task.name);
            continue;
        }
        tracing::info!("Removing task {}", task.name);
        let res = run(&delete_args(&task.name));
        record(&mut report, &task.name, res);
    }
    report
}

/// Task names with whether they are registered.
pub fn list(
    schedule: &Schedule,
    mut run: impl FnMut(&[String]) -> Result<CommandOutcome>,
) -> Vec<(TaskDefinition, bool)> {
    all_tasks(schedule)
        .into_iter()
        .map(|(_, task)| {
            let exists = exists(&task.name, &mut run);
            (task, exists)
        })
        .collect()
}

fn exists(name: &str, run: &mut impl FnMut(&[String]) -> Result<CommandOutcome>) -> bool {
    run(&query_args(name)).is_ok_and(|out| out.code == 0)
}
