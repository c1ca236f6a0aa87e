mod cli;

use anyhow::{Context, Result, bail};
use chocomaint::{
    backup::{self, BackupFile},
    choco::ChocoCli,
    cleanup::{self, CleanupPaths},
    config::{self, Config},
    health,
    install::{self, InstallRequest},
    logging, notify, schedule,
    system::{SystemProbe, WindowsProbe},
    update::{self, UpdateOptions},
};
use clap::{CommandFactory, Parser};
use cli::{BackupAction, ScheduleAction};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

/// Everything a subcommand needs, loaded once per run.
struct App {
    config: Config,
    config_path: PathBuf,
    pm: ChocoCli,
    probe: WindowsProbe,
}

fn main() -> ExitCode {
    // COMPLETE=powershell chocomaint | Out-String | Invoke-Expression
    clap_complete::CompleteEnv::with_factory(cli::Cli::command)
        .bin("chocomaint")
        .complete();

    let cli = cli::Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let (mut config, config_error) = Config::load_or_default(&config_path);
    if let Some(log_file) = cli.log_file {
        config.log_path = log_file;
    }
    if let Err(e) = logging::init(&config.log_path, logging::level(cli.verbose, cli.quiet)) {
        tracing::warn!("Logging to the console only: {e:#}");
    }
    if let Some(e) = config_error {
        tracing::warn!("Using the default configuration: {e:#}");
    }

    let app = App {
        config,
        config_path,
        pm: ChocoCli::locate(),
        probe: WindowsProbe,
    };

    let res = match cli.command {
        cli::Command::Install { packages, dry_run } => install(&app, packages, dry_run),
        cli::Command::Update { force, dry_run } => update(&app, force, dry_run),
        cli::Command::Cleanup { dry_run } => cleanup(&app, dry_run),
        cli::Command::Backup {
            action,
            backup_file,
            yes,
            exact_versions,
        } => backup(&app, action, backup_file.as_deref(), yes, exact_versions),
        cli::Command::Schedule { action } => schedule(&app, action),
        cli::Command::Health { json } => health(&app, json),
        cli::Command::Config => print_config(&app),
    };

    match res {
        Ok(issues) => {
            if issues > 0 {
                tracing::warn!("Finished with {issues} issue(s)");
            }
            ExitCode::from(chocomaint::exit_code(issues))
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn install(app: &App, packages: Vec<String>, dry_run: bool) -> Result<usize> {
    let packages = if packages.is_empty() {
        app.config.packages.clone()
    } else {
        packages
    };
    if packages.is_empty() {
        bail!(
            "No packages given and {} has no \"Packages\" list",
            app.config_path.display()
        )
    }
    let requests: Vec<InstallRequest> = packages.into_iter().map(InstallRequest::latest).collect();
    let report = install::run(&app.pm, &app.probe, &requests, dry_run)?;
    println!("{report}");
    Ok(report.issue_count())
}

fn update(app: &App, force: bool, dry_run: bool) -> Result<usize> {
    let paths = CleanupPaths::discover(&app.pm);
    let options = UpdateOptions { force, dry_run };
    let report = update::run(
        &app.pm,
        &app.probe,
        &app.config,
        &paths,
        options,
        std::thread::sleep,
    )?;

    println!("{report}");
    if let Some(cleanup) = &report.cleanup {
        println!("Cleanup:\n{cleanup}");
    }
    notify::update_finished(&app.config, &app.probe.computer_name(), &report);
    Ok(report.issue_count())
}

fn cleanup(app: &App, dry_run: bool) -> Result<usize> {
    chocomaint::preflight(&app.pm, &app.probe, !dry_run)?;
    let paths = CleanupPaths::discover(&app.pm);
    let report = cleanup::run(&app.pm, &paths, &app.config, dry_run);
    println!("{report}");
    Ok(report.issue_count())
}

fn backup(
    app: &App,
    action: BackupAction,
    file: Option<&Path>,
    yes: bool,
    exact_versions: bool,
) -> Result<usize> {
    let backup_dir = &app.config.backup_path;
    match action {
        BackupAction::Backup => {
            let now = chrono::Local::now().fixed_offset();
            let (path, backup) = backup::create(&app.pm, &app.probe, &app.config, now)?;
            println!("Backed up {} packages to {}", backup.package_count, path.display());
            Ok(0)
        }
        BackupAction::Restore => {
            let path = match file {
                Some(file) => file.to_path_buf(),
                None => backup::newest_backup(backup_dir)?,
            };
            let backup = BackupFile::load(&path)?;
            println!(
                "{}: {} packages from {} ({})",
                path.display(),
                backup.packages.len(),
                backup.computer_name,
                backup.backup_date.to_rfc3339()
            );
            if !yes {
                let confirmed = inquire::Confirm::new("Install the packages that are missing?")
                    .with_default(false)
                    .prompt()
                    .context("Could not read confirmation, pass --yes to skip it")?;
                if !confirmed {
                    println!("Restore cancelled");
                    return Ok(0);
                }
            }
            let report = backup::restore(&app.pm, &app.probe, &backup, exact_versions)?;
            println!("{report}");
            Ok(report.issue_count())
        }
        BackupAction::List => {
            if let Some(file) = file {
                println!("{}", BackupFile::load(file)?);
                return Ok(0);
            }
            let backups = backup::list_backups(backup_dir)?;
            if backups.is_empty() {
                println!("No backups in {}", backup_dir.display());
            }
            for path in backups {
                match BackupFile::load(&path) {
                    Ok(backup) => println!(
                        "{}  {:>4} packages  {}",
                        path.display(),
                        backup.packages.len(),
                        backup.backup_date.format("%Y-%m-%d %H:%M")
                    ),
                    Err(e) => println!("{}  unreadable: {e:#}", path.display()),
                }
            }
            Ok(0)
        }
    }
}

fn schedule(app: &App, action: ScheduleAction) -> Result<usize> {
    let tasks = &app.config.schedule;
    match action {
        ScheduleAction::Install | ScheduleAction::Remove => {
            if !app.probe.is_elevated()? {
                bail!("Managing scheduled tasks must be run as Administrator")
            }
            let report = if action == ScheduleAction::Install {
                let exe = std::env::current_exe().context("Could not locate the chocomaint executable")?;
                schedule::install(tasks, &exe, &app.config_path, schedule::schtasks)
            } else {
                schedule::remove(tasks, schedule::schtasks)
            };
            println!("{report}");
            Ok(report.issue_count())
        }
        ScheduleAction::List => {
            for (task, exists) in schedule::list(tasks, schedule::schtasks) {
                let state = if exists { "registered" } else { "not registered" };
                println!("{:<22} {:<15} weekly {} {}", task.name, state, task.day, task.time);
            }
            Ok(0)
        }
    }
}

fn health(app: &App, json: bool) -> Result<usize> {
    let now = chrono::Local::now().fixed_offset();
    let report = health::run(&app.pm, &app.probe, &app.config, now);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Could not serialize health report")?
        );
    } else {
        println!("{report}");
    }
    Ok(report.issue_count())
}

fn print_config(app: &App) -> Result<usize> {
    println!("// {}", app.config_path.display());
    println!("{}", app.config);
    Ok(0)
}
