//! Connection lifecycle and real-time output for a single e-stim box.

pub mod constants;
pub mod controller;
pub mod link;
pub mod platform;
pub mod session;
pub mod streamer;
pub mod strength;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
