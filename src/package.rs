use serde::{Deserialize, Serialize};

/// An installed package as reported by `choco list --limit-output`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Package {
    pub name: String,
    pub version: String,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// A package with a newer version available, from `choco outdated --limit-output`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutdatedPackage {
    pub name: String,
    pub current: String,
    pub available: String,
    pub pinned: bool,
}

/// Parses `name|version` lines.
///
/// choco mixes warnings and banners into its output even with `--limit-output`,
/// so every line without enough fields is ignored.
pub fn parse_list(output: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('|').map(str::trim);
            let name = fields.next().filter(|n| !n.is_empty())?;
            let version = fields.next()?;
            Some(Package::new(name, version))
        })
        .collect()
}

/// Parses `name|current|available|pinned` lines.
pub fn parse_outdated(output: &str) -> Vec<OutdatedPackage> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            let [name, current, available, pinned, ..] = fields.as_slice() else {
                return None;
            };
            if name.is_empty() {
                return None;
            }
            Some(OutdatedPackage {
                name: name.to_string(),
                current: current.to_string(),
                available: available.to_string(),
                pinned: pinned.eq_ignore_ascii_case("true"),
            })
        })
        .collect()
}

/// Sorts by name ignoring case, the order used in backup files.
pub fn sort_by_name(packages: &mut [Package]) {
    packages.sort_by_key(|p| p.name.to_ascii_lowercase());
}

pub fn contains(packages: &[Package], name: &str) -> bool {
    packages.iter().any(|p| p.is_named(name))
}
