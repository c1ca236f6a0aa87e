use std::path::PathBuf;

use clap::{
    ValueEnum, ValueHint,
    builder::{Styles, styling::AnsiColor},
};

const CLAP_STYLE: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().bold())
    .usage(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::Cyan.on_default().bold())
    .placeholder(AnsiColor::Green.on_default());

/// Chocolatey maintenance: installs, gated updates, cleanup, backups and health checks.
#[derive(clap::Parser)]
#[clap(styles = CLAP_STYLE, version)]
pub struct Cli {
    /// Path of the JSON configuration file.
    ///
    /// Defaults to %ProgramData%\chocomaint\config.json. Missing files use the built-in defaults.
    #[arg(long, global = true, env = "CHOCOMAINT_CONFIG", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Overrides LogPath from the configuration.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,
    /// More log output, repeat for trace level.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Installs packages, skipping those already installed.
    ///
    /// Without arguments, installs the "Packages" list from the configuration.
    #[clap(alias = "i")]
    Install {
        /// Packages to install.
        packages: Vec<String>,
        /// Only report what would be installed.
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Upgrades outdated packages when on the configured WiFi network and on AC power.
    ///
    /// Pinned packages and "ExcludedPackages" are left alone.
    #[clap(alias = "u", alias = "upgrade")]
    Update {
        /// Skip the network and power checks.
        #[arg(short, long)]
        force: bool,
        /// Only report what would be upgraded.
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Frees disk space used by Chocolatey: cache, temp files, failed installs and old logs.
    #[clap(alias = "c", alias = "clean")]
    Cleanup {
        /// Only measure what would be removed.
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Backs up, restores or lists the installed package list.
    #[clap(alias = "b", alias = "bk")]
    Backup {
        #[arg(short, long, value_enum, default_value_t = BackupAction::Backup)]
        action: BackupAction,
        /// Backup file to restore or list. Defaults to the newest backup for restore.
        #[arg(short = 'f', long, value_hint = ValueHint::FilePath)]
        backup_file: Option<PathBuf>,
        /// Do not ask for confirmation before restoring.
        #[arg(short, long)]
        yes: bool,
        /// Restore the exact versions recorded in the backup instead of the latest.
        #[arg(long)]
        exact_versions: bool,
    },
    /// Registers, removes or lists the weekly scheduled tasks.
    #[clap(alias = "s", alias = "sched")]
    Schedule {
        #[arg(short, long, value_enum, default_value_t = ScheduleAction::Install)]
        action: ScheduleAction,
    },
    /// Checks the health of the Chocolatey installation.
    ///
    /// Exits with code 1 when any issue is found.
    #[clap(alias = "doctor")]
    Health {
        /// Print the checks as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Prints the effective configuration.
    Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackupAction {
    Backup,
    Restore,
    List,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScheduleAction {
    Install,
    Remove,
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backup_defaults_to_backup_action() {
        let cli = Cli::try_parse_from(["chocomaint", "backup"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Backup {
                action: BackupAction::Backup,
                backup_file: None,
                ..
            }
        ));
    }

    #[test]
    fn restore_with_file() {
        let cli = Cli::try_parse_from([
            "chocomaint",
            "backup",
            "--action",
            "restore",
            "--backup-file",
            "packages-20240101-000000.json",
            "-y",
        ])
        .unwrap();
        let Command::Backup {
            action,
            backup_file,
            yes,
            ..
        } = cli.command
        else {
            panic!("expected backup command");
        };
        assert_eq!(action, BackupAction::Restore);
        assert_eq!(backup_file, Some(PathBuf::from("packages-20240101-000000.json")));
        assert!(yes);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["chocomaint", "update", "--force", "-vv", "--config", "c.json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        assert!(matches!(cli.command, Command::Update { force: true, dry_run: false }));
    }
}
