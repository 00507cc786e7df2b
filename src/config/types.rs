use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::device::constants::{SCAN_POLL_DELAY, WAVE_TICK_DELAY};
use crate::device::controller::ControllerSettings;
use crate::device::link::DeviceFilter;
use crate::device::types::Channel;
use crate::protocol::constants::{DEVICE_NAME, REQUIRED_SERVICES};
use crate::protocol::BasicWave;

/// Shortest interval accepted for the timers, anything lower is raised to this.
const MIN_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Advertised name a device must have to be offered as a candidate.
    pub device_name: String,
    pub scan_poll_interval_ms: u64,
    pub wave_tick_interval_ms: u64,
    pub wave_a: Option<BasicWave>,
    pub wave_b: Option<BasicWave>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: DEVICE_NAME.to_string(),
            scan_poll_interval_ms: SCAN_POLL_DELAY,
            wave_tick_interval_ms: WAVE_TICK_DELAY,
            wave_a: None,
            wave_b: None,
        }
    }
}

impl Config {
    pub fn wave(&self, channel: Channel) -> Option<BasicWave> {
        match channel {
            Channel::A => self.wave_a,
            Channel::B => self.wave_b,
        }
    }

    pub fn set_wave(&mut self, channel: Channel, wave: Option<BasicWave>) {
        match channel {
            Channel::A => self.wave_a = wave,
            Channel::B => self.wave_b = wave,
        }
    }

    pub fn to_settings(&self) -> ControllerSettings {
        ControllerSettings {
            filter: DeviceFilter {
                name: self.device_name.clone(),
                services: REQUIRED_SERVICES.to_vec(),
            },
            scan_poll_interval: Duration::from_millis(self.scan_poll_interval_ms.max(MIN_INTERVAL_MS)),
            wave_tick_interval: Duration::from_millis(self.wave_tick_interval_ms.max(MIN_INTERVAL_MS)),
            wave_a: self.wave_a,
            wave_b: self.wave_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"waveB": "Tide"}"#).unwrap();
        assert_eq!(config.device_name, "D-LAB ESTIM01");
        assert_eq!(config.scan_poll_interval_ms, 500);
        assert_eq!(config.wave_tick_interval_ms, 100);
        assert_eq!(config.wave(Channel::A), None);
        assert_eq!(config.wave(Channel::B), Some(BasicWave::Tide));
    }

    #[test]
    fn serializes_camel_case() {
        let mut config = Config::default();
        config.set_wave(Channel::A, Some(BasicWave::Pinch));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["deviceName"], "D-LAB ESTIM01");
        assert_eq!(json["waveTickIntervalMs"], 100);
        assert_eq!(json["waveA"], "Pinch");
        assert!(json["waveB"].is_null());
    }

    #[test]
    fn settings_follow_config() {
        let config = Config {
            device_name: "Other".to_string(),
            scan_poll_interval_ms: 0,
            wave_tick_interval_ms: 250,
            wave_a: Some(BasicWave::Breath),
            wave_b: None,
        };

        let settings = config.to_settings();
        assert!(settings.filter.matches(Some("Other")));
        assert!(!settings.filter.matches(Some("D-LAB ESTIM01")));
        assert_eq!(settings.scan_poll_interval, Duration::from_millis(10));
        assert_eq!(settings.wave_tick_interval, Duration::from_millis(250));
        assert_eq!(settings.wave_a, Some(BasicWave::Breath));
    }
}
