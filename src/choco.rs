use crate::package::{self, OutdatedPackage, Package};
use anyhow::{Context, Result, bail};
use std::{path::PathBuf, process::Command};

/// Exit codes choco uses to say the operation worked but Windows must restart.
pub const REBOOT_EXIT_CODES: [i32; 2] = [1641, 3010];

/// The result of a choco invocation that ran to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_code(code: i32) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.code == 0 || self.reboot_required()
    }

    pub fn reboot_required(&self) -> bool {
        REBOOT_EXIT_CODES.contains(&self.code)
    }

    /// Last non-empty output line, which is where choco puts its failure summary.
    pub fn summary(&self) -> Option<&str> {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .rfind(|l| !l.is_empty())
    }
}

/// The package manager operations the maintenance workflows need.
pub trait PackageManager {
    fn is_available(&self) -> bool;
    fn version(&self) -> Result<String>;
    fn installed(&self) -> Result<Vec<Package>>;
    fn outdated(&self) -> Result<Vec<OutdatedPackage>>;
    fn install(&self, name: &str, version: Option<&str>) -> Result<CommandOutcome>;
    fn upgrade(&self, name: &str) -> Result<CommandOutcome>;
    fn clear_cache(&self) -> Result<CommandOutcome>;
    /// Root of the choco installation (`ChocolateyInstall`), if known.
    fn install_dir(&self) -> Option<PathBuf>;
}

/// Runs the real `choco` executable.
#[derive(Debug)]
pub struct ChocoCli {
    exe: PathBuf,
    install_dir: Option<PathBuf>,
}

impl ChocoCli {
    pub fn locate() -> Self {
        let install_dir = std::env::var_os("ChocolateyInstall").map(PathBuf::from);
        let exe = install_dir
            .as_deref()
            .map(|dir| dir.join("bin").join("choco.exe"))
            .filter(|exe| exe.is_file())
            .unwrap_or_else(|| PathBuf::from("choco"));
        Self { exe, install_dir }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutcome> {
        tracing::debug!("Running choco {}", args.join(" "));
        let out = Command::new(&self.exe)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute '{} {}'", self.exe.display(), args.join(" ")))?;
        Ok(CommandOutcome {
            code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    /// Runs a query command, accepting exit code 2 which choco returns for
    /// "nothing found" when enhanced exit codes are enabled.
    fn query(&self, args: &[&str]) -> Result<String> {
        let out = self.run(args)?;
        if out.code != 0 && out.code != 2 {
            bail!(
                "'choco {}' exited with code {}: {}",
                args.join(" "),
                out.code,
                out.summary().unwrap_or("<no output>")
            )
        }
        Ok(out.stdout)
    }
}

impl PackageManager for ChocoCli {
    fn is_available(&self) -> bool {
        self.run(&["--version"]).is_ok_and(|out| out.code == 0)
    }

    fn version(&self) -> Result<String> {
        let out = self.query(&["--version"])?;
        Ok(out.trim().to_string())
    }

    fn installed(&self) -> Result<Vec<Package>> {
        self.query(&["list", "--limit-output"])
            .map(|out| package::parse_list(&out))
            .context("Could not list installed packages")
    }

    fn outdated(&self) -> Result<Vec<OutdatedPackage>> {
        self.query(&["outdated", "--limit-output"])
            .map(|out| package::parse_outdated(&out))
            .context("Could not list outdated packages")
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<CommandOutcome> {
        let mut args = vec!["install", name, "-y", "--no-progress"];
        if let Some(version) = version {
            args.extend(["--version", version]);
        }
        self.run(&args)
    }

    fn upgrade(&self, name: &str) -> Result<CommandOutcome> {
        self.run(&["upgrade", name, "-y", "--no-progress"])
    }

    fn clear_cache(&self) -> Result<CommandOutcome> {
        self.run(&["cache", "remove", "-y"])
    }

    fn install_dir(&self) -> Option<PathBuf> {
        self.install_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reboot_codes_count_as_success() {
        assert!(CommandOutcome::with_code(0).succeeded());
        assert!(CommandOutcome::with_code(3010).succeeded());
        assert!(CommandOutcome::with_code(1641).reboot_required());
        assert!(!CommandOutcome::with_code(1).succeeded());
        assert!(!CommandOutcome::with_code(0).reboot_required());
    }

    #[test]
    fn summary_prefers_last_line() {
        let out = CommandOutcome {
            code: 1,
            stdout: "Installing foo\nThe install of foo was NOT successful.\n\n".into(),
            stderr: String::new(),
        };
        assert_eq!(out.summary(), Some("The install of foo was NOT successful."));
        assert_eq!(CommandOutcome::with_code(1).summary(), None);
    }
}
