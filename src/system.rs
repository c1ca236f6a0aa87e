//! Operating system queries.
//!
//! Everything here shells out to `powershell.exe` or `netsh`. Workflows only
//! see the [`SystemProbe`] trait so they can run against a fake.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, de::DeserializeOwned};
use std::process::{Command, Stdio};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerSource {
    Ac,
    Battery,
    /// Desktops and VMs; treated as mains powered.
    NoBattery,
}

impl PowerSource {
    pub fn is_ac(self) -> bool {
        matches!(self, PowerSource::Ac | PowerSource::NoBattery)
    }
}

pub trait SystemProbe {
    fn is_elevated(&self) -> Result<bool>;
    /// SSID of the connected wireless network, `None` when not connected.
    fn current_ssid(&self) -> Result<Option<String>>;
    fn power_source(&self) -> Result<PowerSource>;
    /// Free bytes on the system drive.
    fn free_disk_bytes(&self) -> Result<u64>;
    fn reboot_pending(&self) -> Result<bool>;
    fn computer_name(&self) -> String;
}

#[derive(Debug, Default)]
pub struct WindowsProbe;

impl SystemProbe for WindowsProbe {
    fn is_elevated(&self) -> Result<bool> {
        let out = run_ps(
            "([Security.Principal.WindowsPrincipal][Security.Principal.WindowsIdentity]::GetCurrent()).IsInRole([Security.Principal.WindowsBuiltInRole]::Administrator)",
        )?;
        Ok(parse_bool(&out))
    }

    fn current_ssid(&self) -> Result<Option<String>> {
        let out = Command::new("netsh")
            .args(["wlan", "show", "interfaces"])
            .stdin(Stdio::null())
            .output()
            .context("Failed to execute 'netsh wlan show interfaces'")?;
        // netsh exits non-zero when the WLAN service is not running
        if !out.status.success() {
            return Ok(None);
        }
        Ok(parse_ssid(&String::from_utf8_lossy(&out.stdout)))
    }

    fn power_source(&self) -> Result<PowerSource> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Battery {
            has_battery: bool,
            status: u16,
        }
        let battery: Battery = run_ps_json(
            r#"$bat = @(Get-CimInstance Win32_Battery -ErrorAction SilentlyContinue)
if ($bat.Count -gt 0) { [PSCustomObject]@{ hasBattery=$true; status=[int]$bat[0].BatteryStatus } | ConvertTo-Json -Compress }
else { '{"hasBattery":false,"status":0}' }"#,
        )?;
        Ok(if battery.has_battery {
            power_from_battery_status(battery.status)
        } else {
            PowerSource::NoBattery
        })
    }

    fn free_disk_bytes(&self) -> Result<u64> {
        let out = run_ps(
            r#"(Get-CimInstance Win32_LogicalDisk -Filter "DeviceID='$env:SystemDrive'").FreeSpace"#,
        )?;
        out.trim()
            .parse()
            .with_context(|| format!("Unexpected free space value {out:?}"))
    }

    fn reboot_pending(&self) -> Result<bool> {
        let out = run_ps(
            r#"(Test-Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\WindowsUpdate\Auto Update\RebootRequired') -or (Test-Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\Component Based Servicing\RebootPending')"#,
        )?;
        Ok(parse_bool(&out))
    }

    fn computer_name(&self) -> String {
        computer_name()
    }
}

pub fn computer_name() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| String::from("unknown"))
}

/// Runs a PowerShell script and returns its trimmed stdout.
pub fn run_ps(script: &str) -> Result<String> {
    let full_script = format!("[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; {script}");
    let out = Command::new("powershell.exe")
        .args([
            "-NoProfile",
            "-NonInteractive",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            &full_script,
        ])
        .stdin(Stdio::null())
        .output()
        .context("Failed to start powershell.exe")?;
    if !out.status.success() {
        bail!(
            "PowerShell exited with code {}: {} {}",
            out.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&out.stderr).trim(),
            String::from_utf8_lossy(&out.stdout).trim()
        )
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

pub fn run_ps_json<T: DeserializeOwned>(script: &str) -> Result<T> {
    let out = run_ps(script)?;
    serde_json::from_str(&out).with_context(|| {
        let head: String = out.chars().take(200).collect();
        format!("Could not parse PowerShell output: {head}")
    })
}

/// Characters PowerShell accepts as single-quote string delimiters.
const SINGLE_QUOTES: [char; 5] = ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Escapes a value for use inside a single-quoted PowerShell string.
pub fn ps_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if SINGLE_QUOTES.contains(&c) {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

fn parse_bool(out: &str) -> bool {
    out.trim().eq_ignore_ascii_case("true")
}

/// Extracts the `SSID` field from `netsh wlan show interfaces`.
///
/// The `BSSID` line must not match, and a disconnected adapter prints no SSID.
pub fn parse_ssid(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "SSID" {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Maps `Win32_Battery.BatteryStatus`. 2 is "on AC", 6 to 9 are charging states.
pub fn power_from_battery_status(status: u16) -> PowerSource {
    match status {
        2 | 6..=9 => PowerSource::Ac,
        _ => PowerSource::Battery,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSH: &str = "
There is 1 interface on the system:

    Name                   : Wi-Fi
    Description            : Intel(R) Wi-Fi 6 AX201 160MHz
    State                  : connected
    SSID                   : Home Network
    BSSID                  : aa:bb:cc:dd:ee:ff
    Network type           : Infrastructure
";

    #[test]
    fn ssid_is_read_from_netsh() {
        assert_eq!(parse_ssid(NETSH).as_deref(), Some("Home Network"));
    }

    #[test]
    fn disconnected_adapter_has_no_ssid() {
        let output = "    Name                   : Wi-Fi\n    State                  : disconnected\n";
        assert_eq!(parse_ssid(output), None);
    }

    #[test]
    fn battery_status_mapping() {
        assert_eq!(power_from_battery_status(2), PowerSource::Ac);
        assert_eq!(power_from_battery_status(7), PowerSource::Ac);
        assert_eq!(power_from_battery_status(1), PowerSource::Battery);
        assert!(PowerSource::NoBattery.is_ac());
        assert!(!PowerSource::Battery.is_ac());
    }

    #[test]
    fn ps_quote_doubles_single_quotes() {
        assert_eq!(ps_quote("it's"), "'it''s'");
    }

    #[test]
    fn ps_quote_doubles_typographic_quotes() {
        assert_eq!(
            ps_quote("Can\u{2019}t; Remove-Item x"),
            "'Can\u{2019}\u{2019}t; Remove-Item x'"
        );
        assert_eq!(ps_quote("\u{2018}a\u{201A}\u{201B}"), "'\u{2018}\u{2018}a\u{201A}\u{201A}\u{201B}\u{201B}'");
    }
}
