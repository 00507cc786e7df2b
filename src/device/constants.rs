/**
 * How often (milliseconds) the candidate list is pulled from the broker while discovering.
 */
pub const SCAN_POLL_DELAY: u64 = 500;

/**
 * How often (milliseconds) each channel's wave generator is ticked.
 */
pub const WAVE_TICK_DELAY: u64 = 100;

/**
 * Capacity of the channel carrying commands from the UI to the device controller.
 */
pub const COMMAND_CHANNEL_SIZE: usize = 32;

/**
 * Capacity of the channel carrying device events to the UI.
 */
pub const EVENT_CHANNEL_SIZE: usize = 64;

/**
 * How long (milliseconds) closing the window waits for the device to be left idle and disconnected.
 */
pub const SHUTDOWN_TIMEOUT: u64 = 3000;
