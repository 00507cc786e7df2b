//! Encoding and decoding for the DG-LAB e-stim box (v2 protocol).
//!
//! The connection code only talks to the device through this module: status decoders for the
//! values the device notifies, the combined AB power command, and one wave generator per channel.

pub mod constants;
pub mod status;
pub mod wave;

pub use status::{AbPowerDecoder, BatteryDecoder, encode_ab_power, MAX_STRENGTH};
pub use wave::{BasicWave, WaveCenter, WaveFrame, WavePattern};
