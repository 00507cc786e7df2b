use std::sync::{Arc, Mutex, PoisonError};

use crate::device::types::Channel;
use crate::protocol::{encode_ab_power, BasicWave, WaveCenter, MAX_STRENGTH};

pub type SharedWaveCenter = Arc<Mutex<WaveCenter>>;

/// Clamps user input to a valid strength level.
pub fn clamp_strength(input: i64) -> u16 {
    input.clamp(0, i64::from(MAX_STRENGTH)) as u16
}

/// Parses strength input as typed by the user. Returns `None` if it is not a number, in which
/// case the input should be ignored.
pub fn parse_strength(input: &str) -> Option<u16> {
    input.trim().parse::<i64>().ok().map(clamp_strength)
}

#[derive(Debug)]
pub struct ChannelState {
    strength: u16,
    active_wave: Option<BasicWave>,
    wave_center: SharedWaveCenter,
}

impl ChannelState {
    fn new() -> Self {
        ChannelState {
            strength: 0,
            active_wave: None,
            wave_center: Arc::new(Mutex::new(WaveCenter::new())),
        }
    }

    pub fn strength(&self) -> u16 {
        self.strength
    }

    pub fn active_wave(&self) -> Option<BasicWave> {
        self.active_wave
    }

    pub fn wave_center(&self) -> SharedWaveCenter {
        self.wave_center.clone()
    }
}

/// Strength and wave selection of both output channels.
#[derive(Debug)]
pub struct Channels {
    a: ChannelState,
    b: ChannelState,
}

impl Default for Channels {
    fn default() -> Self {
        Channels { a: ChannelState::new(), b: ChannelState::new() }
    }
}

impl Channels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: Channel) -> &ChannelState {
        match channel {
            Channel::A => &self.a,
            Channel::B => &self.b,
        }
    }

    fn get_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::A => &mut self.a,
            Channel::B => &mut self.b,
        }
    }

    /// Clamps and stores the strength of one channel, returning the committed value.
    pub fn commit_strength(&mut self, channel: Channel, input: i64) -> u16 {
        let value = clamp_strength(input);
        self.get_mut(channel).strength = value;
        value
    }

    pub fn reset_strengths(&mut self) {
        self.a.strength = 0;
        self.b.strength = 0;
    }

    /// The combined power command for the currently committed strengths of both channels.
    pub fn power_command(&self) -> [u8; 3] {
        encode_ab_power(self.a.strength, self.b.strength)
    }

    /// Replaces the wave pattern of one channel. The generator drops the previous pattern before
    /// the new one is installed.
    pub fn select_wave(&mut self, channel: Channel, wave: Option<BasicWave>) {
        let state = self.get_mut(channel);
        state.active_wave = wave;

        let mut center = state.wave_center.lock().unwrap_or_else(PoisonError::into_inner);
        center.select(None);
        center.select(wave.map(|wave| wave.pattern()));
    }
}
