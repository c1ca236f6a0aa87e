use crate::{config::Config, system::SystemProbe};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateDecision {
    pub wifi_ok: bool,
    pub power_ok: bool,
}

impl GateDecision {
    pub fn proceed(&self) -> bool {
        self.wifi_ok && self.power_ok
    }

    pub fn reason(&self) -> Option<&'static str> {
        match (self.wifi_ok, self.power_ok) {
            (true, true) => None,
            (false, _) => Some("not connected to the configured WiFi network"),
            (true, false) => Some("running on battery power"),
        }
    }
}

/// Polls the connected SSID up to `attempts` times, sleeping `delay` between polls.
pub fn wait_for_ssid(
    probe: &dyn SystemProbe,
    expected: &str,
    attempts: u32,
    delay: Duration,
    mut sleep: impl FnMut(Duration),
) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match probe.current_ssid() {
            Ok(Some(ssid)) if ssid == expected => {
                tracing::info!("Connected to {expected:?}");
                return true;
            }
            Ok(Some(ssid)) => {
                tracing::info!("Attempt {attempt}/{attempts}: connected to {ssid:?}, expected {expected:?}")
            }
            Ok(None) => tracing::info!("Attempt {attempt}/{attempts}: no WiFi connection"),
            Err(e) => tracing::warn!("Attempt {attempt}/{attempts}: could not query WiFi: {e:#}"),
        }
        if attempt < attempts {
            sleep(delay);
        }
    }
    false
}

pub fn check_power(probe: &dyn SystemProbe) -> bool {
    match probe.power_source() {
        Ok(source) => {
            tracing::info!("Power source: {source:?}");
            source.is_ac()
        }
        Err(e) => {
            tracing::warn!("Could not query power status, assuming battery: {e:#}");
            false
        }
    }
}

pub fn evaluate(probe: &dyn SystemProbe, config: &Config, sleep: impl FnMut(Duration)) -> GateDecision {
    let wifi_ok = config.wifi_ssid.is_empty()
        || wait_for_ssid(
            probe,
            &config.wifi_ssid,
            config.wifi_retry_count,
            config.wifi_retry_delay(),
            sleep,
        );
    let power_ok = wifi_ok && (!config.require_ac_power || check_power(probe));
    GateDecision { wifi_ok, power_ok }
}
