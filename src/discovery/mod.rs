//! Device discovery, split between the host side (the broker, which owns the pending chooser
//! callback) and the UI side (the poller, which renders the candidate list).

pub mod broker;
pub mod poller;
pub mod types;

pub use broker::{Broker, BrokerHandle, broker_task};
pub use poller::poll_candidates;
pub use types::{CandidateDevice, sort_candidates};
