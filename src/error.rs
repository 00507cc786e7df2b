use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use uuid::Uuid;
use btleplug;
use iced;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to open log file: {source}")]
    LogFile { source: io::Error },

    #[error("Failed to initialize logger: {source}")]
    Logger { #[from] source: log::SetLoggerError },
}

/// Errors raised by the discovery broker. The first two are violations of the
/// chooser callback contract and indicate an integration bug on the caller side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("No device chooser is pending")]
    NoPendingChooser,

    #[error("Device {id} is not a known candidate")]
    UnknownCandidate { id: String },

    #[error("The discovery broker is no longer running")]
    BrokerUnavailable,
}

impl DiscoveryError {
    pub fn is_callback_misuse(&self) -> bool {
        matches!(self, DiscoveryError::NoPendingChooser | DiscoveryError::UnknownCandidate { .. })
    }
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("Not allowed to access Bluetooth")]
    PermissionDenied,

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Failed to connect to device: {reason}")]
    ConnectFailure { reason: String },

    #[error("The device does not expose the required service {0}")]
    MissingService(Uuid),

    #[error("The device does not expose the required characteristic {0}")]
    MissingCharacteristic(Uuid),

    #[error("The device chooser was replaced by a newer one")]
    ChooserAbandoned,

    #[error("The device chooser failed: {reason}")]
    ChooserFailed { reason: String },

    #[error("No device is connected")]
    NotConnected,

    #[error("Device discovery failed: {source}")]
    Discovery { #[from] source: DiscoveryError },
}

impl DeviceError {
    /// Maps btleplug's permission error onto our own variant, so that callers do not have to look
    /// into the source error.
    pub fn from_btle(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => DeviceError::PermissionDenied,
            other => DeviceError::Btle { source: other },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_misuse_kinds() {
        assert!(DiscoveryError::NoPendingChooser.is_callback_misuse());
        assert!(DiscoveryError::UnknownCandidate { id: "X".to_string() }.is_callback_misuse());
        assert!(!DiscoveryError::BrokerUnavailable.is_callback_misuse());
    }

    #[test]
    fn permission_denied_is_mapped() {
        assert!(matches!(DeviceError::from_btle(btleplug::Error::PermissionDenied), DeviceError::PermissionDenied));
        assert!(matches!(DeviceError::from_btle(btleplug::Error::DeviceNotFound), DeviceError::Btle { .. }));
    }
}
