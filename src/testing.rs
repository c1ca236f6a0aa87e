//! In-memory package manager and system probe for workflow tests.

use crate::{
    choco::{CommandOutcome, PackageManager},
    package::{OutdatedPackage, Package},
    system::{PowerSource, SystemProbe},
};
use anyhow::{Result, bail};
use std::{cell::RefCell, collections::HashMap, path::PathBuf};

#[derive(Default)]
pub struct FakePackageManager {
    pub available: bool,
    pub installed: RefCell<Vec<Package>>,
    pub outdated: Vec<OutdatedPackage>,
    /// Exit codes for install/upgrade of specific packages, 0 otherwise.
    pub exit_codes: HashMap<String, i32>,
    pub install_dir: Option<PathBuf>,
    pub cache_code: i32,
    pub calls: RefCell<Vec<String>>,
}

impl FakePackageManager {
    pub fn new() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    pub fn with_installed(self, packages: &[(&str, &str)]) -> Self {
        *self.installed.borrow_mut() = packages
            .iter()
            .map(|(name, version)| Package::new(*name, *version))
            .collect();
        self
    }

    pub fn with_outdated(mut self, packages: &[(&str, &str, &str, bool)]) -> Self {
        self.outdated = packages
            .iter()
            .map(|(name, current, available, pinned)| OutdatedPackage {
                name: name.to_string(),
                current: current.to_string(),
                available: available.to_string(),
                pinned: *pinned,
            })
            .collect();
        self
    }

    pub fn failing(mut self, name: &str, code: i32) -> Self {
        self.exit_codes.insert(name.to_string(), code);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn outcome(&self, name: &str) -> CommandOutcome {
        CommandOutcome::with_code(self.exit_codes.get(name).copied().unwrap_or(0))
    }
}

impl PackageManager for FakePackageManager {
    fn is_available(&self) -> bool {
        self.available
    }

    fn version(&self) -> Result<String> {
        if !self.available {
            bail!("choco not found")
        }
        Ok(String::from("2.2.2"))
    }

    fn installed(&self) -> Result<Vec<Package>> {
        self.calls.borrow_mut().push(String::from("list"));
        Ok(self.installed.borrow().clone())
    }

    fn outdated(&self) -> Result<Vec<OutdatedPackage>> {
        self.calls.borrow_mut().push(String::from("outdated"));
        Ok(self.outdated.clone())
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<CommandOutcome> {
        let call = match version {
            Some(v) => format!("install {name} {v}"),
            None => format!("install {name}"),
        };
        self.calls.borrow_mut().push(call);
        let outcome = self.outcome(name);
        if outcome.succeeded() {
            self.installed
                .borrow_mut()
                .push(Package::new(name, version.unwrap_or("1.0.0")));
        }
        Ok(outcome)
    }

    fn upgrade(&self, name: &str) -> Result<CommandOutcome> {
        self.calls.borrow_mut().push(format!("upgrade {name}"));
        Ok(self.outcome(name))
    }

    fn clear_cache(&self) -> Result<CommandOutcome> {
        self.calls.borrow_mut().push(String::from("cache remove"));
        Ok(CommandOutcome::with_code(self.cache_code))
    }

    fn install_dir(&self) -> Option<PathBuf> {
        self.install_dir.clone()
    }
}

pub struct FakeProbe {
    pub elevated: bool,
    /// SSIDs returned by successive queries; the last one repeats.
    pub ssids: Vec<Option<String>>,
    pub power: PowerSource,
    pub free_bytes: u64,
    pub reboot_pending: bool,
    pub ssid_queries: RefCell<usize>,
    pub power_queries: RefCell<usize>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            elevated: true,
            ssids: vec![None],
            power: PowerSource::Ac,
            free_bytes: 100 * crate::GIB,
            reboot_pending: false,
            ssid_queries: RefCell::new(0),
            power_queries: RefCell::new(0),
        }
    }
}

impl FakeProbe {
    pub fn on_ssid(ssid: &str) -> Self {
        Self {
            ssids: vec![Some(ssid.to_string())],
            ..Self::default()
        }
    }
}

impl SystemProbe for FakeProbe {
    fn is_elevated(&self) -> Result<bool> {
        Ok(self.elevated)
    }

    fn current_ssid(&self) -> Result<Option<String>> {
        let mut queries = self.ssid_queries.borrow_mut();
        let ssid = self
            .ssids
            .get(*queries)
            .or(self.ssids.last())
            .cloned()
            .flatten();
        *queries += 1;
        Ok(ssid)
    }

    fn power_source(&self) -> Result<PowerSource> {
        *self.power_queries.borrow_mut() += 1;
        Ok(self.power)
    }

    fn free_disk_bytes(&self) -> Result<u64> {
        Ok(self.free_bytes)
    }

    fn reboot_pending(&self) -> Result<bool> {
        Ok(self.reboot_pending)
    }

    fn computer_name(&self) -> String {
        String::from("TESTPC")
    }
}
