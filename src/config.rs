use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// Network the machine must be on before updating. Empty disables the check.
    pub wifi_ssid: String,
    pub wifi_retry_count: u32,
    pub wifi_retry_delay_secs: u64,
    pub require_ac_power: bool,

    pub toast_notifications: bool,
    pub email_notifications: bool,
    pub email_address: String,
    pub email_from: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_use_ssl: bool,
    pub smtp_username: String,
    /// Name of the environment variable holding the SMTP password.
    pub smtp_password_env: String,

    pub backup_path: PathBuf,
    /// Newest backups to keep, 0 keeps all of them.
    pub backup_retention: usize,
    pub log_path: PathBuf,

    pub packages: Vec<String>,
    pub excluded_packages: Vec<String>,
    pub cleanup_after_update: bool,
    pub log_retention_days: u64,
    pub min_free_disk_gb: u64,
    pub max_backup_age_days: i64,

    pub schedule: Schedule,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            wifi_ssid: String::new(),
            wifi_retry_count: 3,
            wifi_retry_delay_secs: 10,
            require_ac_power: true,
            toast_notifications: true,
            email_notifications: false,
            email_address: String::new(),
            email_from: String::new(),
            smtp_server: String::new(),
            smtp_port: 587,
            smtp_use_ssl: true,
            smtp_username: String::new(),
            smtp_password_env: String::from("CHOCOMAINT_SMTP_PASSWORD"),
            backup_path: data_dir.join("backups"),
            backup_retention: 10,
            log_path: data_dir.join("chocomaint.log"),
            packages: Vec::new(),
            excluded_packages: Vec::new(),
            cleanup_after_update: true,
            log_retention_days: 30,
            min_free_disk_gb: 10,
            max_backup_age_days: 7,
            schedule: Schedule::default(),
        }
    }
}

/// Weekly scheduled task settings. Days use the schtasks names (MON..SUN).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Schedule {
    pub update_enabled: bool,
    pub update_day: String,
    pub update_time: String,
    pub cleanup_enabled: bool,
    pub cleanup_day: String,
    pub cleanup_time: String,
    pub backup_enabled: bool,
    pub backup_day: String,
    pub backup_time: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            update_enabled: true,
            update_day: String::from("SUN"),
            update_time: String::from("03:00"),
            cleanup_enabled: true,
            cleanup_day: String::from("SUN"),
            cleanup_time: String::from("04:00"),
            backup_enabled: true,
            backup_day: String::from("SAT"),
            backup_time: String::from("03:00"),
        }
    }
}

impl Config {
    /// Reads the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Config> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Could not open config file {}", path.display()));
            }
        };
        serde_json::from_reader::<_, Config>(file)
            .with_context(|| format!("Could not parse config file {}", path.display()))
    }

    /// Like [`Config::load`], but an unreadable or invalid file falls back to
    /// the defaults. The error is returned so it can be logged once logging is up.
    pub fn load_or_default(path: &Path) -> (Config, Option<anyhow::Error>) {
        match Config::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    pub fn wifi_retry_delay(&self) -> Duration {
        Duration::from_secs(self.wifi_retry_delay_secs)
    }

    pub fn email_sender(&self) -> &str {
        if self.email_from.is_empty() {
            &self.email_address
        } else {
            &self.email_from
        }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_packages
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&json)
    }
}

/// `%ProgramData%\chocomaint`, falling back to the XDG data directory.
pub fn data_dir() -> PathBuf {
    std::env::var("ProgramData")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("XDG_DATA_HOME").map(PathBuf::from))
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|_| std::env::temp_dir())
        .join("chocomaint")
}

pub fn default_config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE_NAME)
}
