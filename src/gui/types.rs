use iced::Event;

use crate::config::types::Config;
use crate::device::telemetry::TelemetrySnapshot;
use crate::device::types::{Affordances, Channel, ConnectionState, DeviceEvent};
use crate::discovery::CandidateDevice;
use crate::protocol::BasicWave;

/// Entry of the wave pattern picker. `None` turns the channel's pattern off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveChoice(pub Option<BasicWave>);

pub const WAVE_CHOICES: [WaveChoice; 5] = [
    WaveChoice(None),
    WaveChoice(Some(BasicWave::Breath)),
    WaveChoice(Some(BasicWave::Tide)),
    WaveChoice(Some(BasicWave::Batter)),
    WaveChoice(Some(BasicWave::Pinch)),
];

impl std::fmt::Display for WaveChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            None => write!(f, "Off"),
            Some(wave) => write!(f, "{}", wave),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    ApplyDirtyConfig,
    ConfigLoadComplete((Config, Option<String>)),
    ConfigSaveComplete(Option<String>),
    NoticeConfirmed,
    DeviceEvent(DeviceEvent),
    Scan,
    SelectCandidate(String),
    Disconnect,
    StrengthInput(Channel, String),
    StrengthSubmit(Channel),
    WaveSelected(Channel, WaveChoice),
    ShutdownTimedOut,
}

/// What the device panel shows, as far as it is driven by controller events.
#[derive(Debug, Clone)]
pub struct DeviceView {
    pub state: ConnectionState,
    pub candidates: Vec<CandidateDevice>,
    /// Id and name of the connected device.
    pub connected_to: Option<(String, String)>,
    pub telemetry: TelemetrySnapshot,
    pub strength_a: u16,
    pub strength_b: u16,
}

impl Default for DeviceView {
    fn default() -> Self {
        DeviceView {
            state: ConnectionState::Disconnected,
            candidates: Vec::new(),
            connected_to: None,
            telemetry: TelemetrySnapshot::default(),
            strength_a: 0,
            strength_b: 0,
        }
    }
}

impl DeviceView {
    pub fn apply(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::StateChange(state) => {
                self.state = *state;
                match state {
                    ConnectionState::Connecting => self.candidates.clear(),
                    ConnectionState::Disconnected => {
                        self.connected_to = None;
                        self.telemetry = TelemetrySnapshot::default();
                    },
                    _ => {},
                }
            },
            DeviceEvent::Candidates(candidates) => {
                // a late poll must not bring back the list once a connection started
                if self.state == ConnectionState::Disconnected {
                    self.candidates = candidates.clone();
                }
            },
            DeviceEvent::Connected { id, name } => {
                self.connected_to = Some((id.clone(), name.clone()));
            },
            DeviceEvent::Telemetry(update) => self.telemetry.apply(*update),
            DeviceEvent::StrengthCommitted { channel: Channel::A, value } => self.strength_a = *value,
            DeviceEvent::StrengthCommitted { channel: Channel::B, value } => self.strength_b = *value,
            DeviceEvent::Ready(_) | DeviceEvent::Notice(_) | DeviceEvent::Stopped => {},
        }
    }

    pub fn strength(&self, channel: Channel) -> u16 {
        match channel {
            Channel::A => self.strength_a,
            Channel::B => self.strength_b,
        }
    }

    pub fn affordances(&self) -> Affordances {
        Affordances::for_state(self.state)
    }

    pub fn status_message(&self) -> String {
        match (self.state, &self.connected_to) {
            (ConnectionState::Disconnected, _) if self.candidates.is_empty() => "Not connected".to_string(),
            (ConnectionState::Disconnected, _) => "Select a device".to_string(),
            (ConnectionState::Connecting, _) => "Connecting…".to_string(),
            (ConnectionState::Connected, Some((id, name))) => format!("Connected to {} ({})", name, id),
            (ConnectionState::Connected, None) => "Connected".to_string(),
            (ConnectionState::Disconnecting, _) => "Disconnecting…".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::TelemetryUpdate;

    #[test]
    fn connected_status_names_the_device() {
        let mut view = DeviceView::default();
        view.apply(&DeviceEvent::StateChange(ConnectionState::Connecting));
        assert_eq!(view.status_message(), "Connecting…");

        view.apply(&DeviceEvent::StateChange(ConnectionState::Connected));
        view.apply(&DeviceEvent::Connected { id: "AA:BB".to_string(), name: "D-LAB ESTIM01".to_string() });
        assert_eq!(view.status_message(), "Connected to D-LAB ESTIM01 (AA:BB)");
        assert!(view.affordances().disconnect);
    }

    #[test]
    fn candidates_are_hidden_after_connecting() {
        let mut view = DeviceView::default();
        view.apply(&DeviceEvent::Candidates(vec![CandidateDevice::new("X", "Bravo")]));
        assert_eq!(view.candidates.len(), 1);

        view.apply(&DeviceEvent::StateChange(ConnectionState::Connecting));
        view.apply(&DeviceEvent::Candidates(vec![CandidateDevice::new("X", "Bravo")]));
        assert!(view.candidates.is_empty());
    }

    #[test]
    fn disconnect_clears_device_details() {
        let mut view = DeviceView::default();
        view.apply(&DeviceEvent::StateChange(ConnectionState::Connected));
        view.apply(&DeviceEvent::Connected { id: "X".to_string(), name: "Bravo".to_string() });
        view.apply(&DeviceEvent::Telemetry(TelemetryUpdate::Battery(50)));
        view.apply(&DeviceEvent::StrengthCommitted { channel: Channel::B, value: 274 });

        assert_eq!(view.telemetry.battery_percent, Some(50));
        assert_eq!(view.strength(Channel::B), 274);

        view.apply(&DeviceEvent::StateChange(ConnectionState::Disconnected));
        assert_eq!(view.connected_to, None);
        assert_eq!(view.telemetry, TelemetrySnapshot::default());
        assert_eq!(view.status_message(), "Not connected");
    }

    #[test]
    fn wave_choices_cover_every_wave() {
        for wave in BasicWave::ALL {
            assert!(WAVE_CHOICES.contains(&WaveChoice(Some(wave))));
        }
        assert_eq!(WAVE_CHOICES[0].to_string(), "Off");
        assert_eq!(WaveChoice(Some(BasicWave::Tide)).to_string(), "Tide");
    }
}
