use crate::device::controller::ControllerHandle;
use crate::discovery::CandidateDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub const BOTH: [Channel; 2] = [Channel::A, Channel::B];
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Channel::A => "A",
            Channel::B => "B",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryUpdate {
    Battery(u8),
    Power { a: u16, b: u16 },
}

/// Which parts of the device UI are available. Only depends on the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub scan: bool,
    pub candidate_list: bool,
    pub disconnect: bool,
    pub status_panel: bool,
    pub controls: bool,
}

impl Affordances {
    pub fn for_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Disconnected => Affordances {
                scan: true,
                candidate_list: true,
                disconnect: false,
                status_panel: false,
                controls: false,
            },
            ConnectionState::Connecting => Affordances {
                scan: false,
                candidate_list: false,
                disconnect: false,
                status_panel: false,
                controls: false,
            },
            ConnectionState::Connected => Affordances {
                scan: false,
                candidate_list: false,
                disconnect: true,
                status_panel: true,
                controls: true,
            },
            ConnectionState::Disconnecting => Affordances {
                scan: false,
                candidate_list: false,
                disconnect: false,
                status_panel: true,
                controls: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The controller is running and accepts commands through this handle.
    Ready(ControllerHandle),
    StateChange(ConnectionState),
    /// Candidates of the current discovery round, sorted for display.
    Candidates(Vec<CandidateDevice>),
    Connected { id: String, name: String },
    Telemetry(TelemetryUpdate),
    StrengthCommitted { channel: Channel, value: u16 },
    /// Something the user should be told about, usually a failure.
    Notice(String),
    /// The controller has left the device idle and disconnected, and accepts no more commands.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_only_while_disconnected() {
        assert!(Affordances::for_state(ConnectionState::Disconnected).scan);
        assert!(!Affordances::for_state(ConnectionState::Connecting).scan);
        assert!(!Affordances::for_state(ConnectionState::Connected).scan);
        assert!(!Affordances::for_state(ConnectionState::Disconnecting).scan);
    }

    #[test]
    fn disconnect_only_while_connected() {
        let connected = Affordances::for_state(ConnectionState::Connected);
        assert!(connected.disconnect && connected.status_panel && connected.controls);

        let disconnecting = Affordances::for_state(ConnectionState::Disconnecting);
        assert!(!disconnecting.disconnect);
    }
}
