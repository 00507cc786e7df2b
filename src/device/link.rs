//! The boundary between the connection logic and the platform's Bluetooth stack.

use std::pin::Pin;
use async_trait::async_trait;
use futures::channel::oneshot;
use futures::Stream;
use uuid::Uuid;

use crate::discovery::CandidateDevice;
use crate::error::DeviceError;

/// A primary service and the characteristics it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// A resolved characteristic, identified by its service and its own UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

/// Which devices a chooser offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Advertised name, matched exactly.
    pub name: String,
    /// Services that must be accessible once connected.
    pub services: Vec<Uuid>,
}

impl DeviceFilter {
    pub fn matches(&self, local_name: Option<&str>) -> bool {
        local_name == Some(self.name.as_str())
    }
}

/// A device handle together with its GATT server.
#[async_trait]
pub trait GattLink: Clone + Send + Sync + 'static {
    fn id(&self) -> String;

    fn name(&self) -> String;

    async fn connect(&self) -> Result<(), DeviceError>;

    async fn disconnect(&self) -> Result<(), DeviceError>;

    async fn discover_services(&self) -> Result<Vec<GattService>, DeviceError>;

    async fn read(&self, characteristic: &CharacteristicRef) -> Result<Vec<u8>, DeviceError>;

    /// Writes without waiting for the device to acknowledge.
    async fn write(&self, characteristic: &CharacteristicRef, data: &[u8]) -> Result<(), DeviceError>;

    async fn subscribe(&self, characteristic: &CharacteristicRef) -> Result<(), DeviceError>;

    /// Value changes of every subscribed characteristic.
    async fn notifications(&self) -> Result<NotificationStream, DeviceError>;

    /// Resolves once the link is gone, whether we asked for it or the device dropped it.
    async fn disconnected(&self) -> Result<(), DeviceError>;
}

/// Opens device choosers.
#[async_trait]
pub trait BlePlatform: Send + Sync + 'static {
    type Link: GattLink;

    /// Offers devices that pass `filter` to the broker until `chosen`, the chooser opened on the
    /// broker for this round, yields the device the user picked.
    ///
    /// Fails with [`DeviceError::ChooserAbandoned`] if a newer chooser replaced this one.
    async fn request_device(
        &self,
        filter: DeviceFilter,
        chosen: oneshot::Receiver<CandidateDevice>,
    ) -> Result<Self::Link, DeviceError>;
}
