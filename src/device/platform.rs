use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::channel::oneshot;
use futures::StreamExt;
use log::{debug, info, warn};

use crate::device::link::{BlePlatform, CharacteristicRef, DeviceFilter, GattLink, GattService, Notification, NotificationStream};
use crate::discovery::{BrokerHandle, CandidateDevice};
use crate::error::DeviceError;

/// Returns the first bluetooth adapter of the system.
pub async fn default_adapter() -> Result<Adapter, DeviceError> {
    let manager = Manager::new().await.map_err(DeviceError::from_btle)?;
    let adapters = manager.adapters().await.map_err(DeviceError::from_btle)?;

    let adapter = adapters.into_iter().next().ok_or(DeviceError::NoAdapter)?;
    info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
    Ok(adapter)
}

/// Device chooser backed by btleplug scanning. Discovered devices are offered to the user through
/// the broker.
pub struct BtlePlatform {
    adapter: Adapter,
    broker: BrokerHandle,
}

impl BtlePlatform {
    pub fn new(adapter: Adapter, broker: BrokerHandle) -> Self {
        BtlePlatform { adapter, broker }
    }

    async fn offer_peripheral(&self, peripheral: &Peripheral, filter: &DeviceFilter) {
        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => return,
            Err(err) => {
                warn!("Could not query peripheral for properties: {:?}", err);
                return;
            },
        };

        if !filter.matches(properties.local_name.as_deref()) {
            return;
        }

        let candidate = CandidateDevice::new(
            peripheral.id().to_string(),
            properties.local_name.unwrap_or_default(),
        );
        if let Err(err) = self.broker.register_candidate(candidate).await {
            warn!("Failed to register candidate: {}", err);
        }
    }

    async fn find_peripheral(&self, id: &str) -> Result<Peripheral, DeviceError> {
        let peripherals = self.adapter.peripherals().await.map_err(DeviceError::from_btle)?;

        peripherals
            .into_iter()
            .find(|peripheral| peripheral.id().to_string() == id)
            .ok_or_else(|| DeviceError::ChooserFailed { reason: format!("device {} is gone", id) })
    }
}

#[async_trait]
impl BlePlatform for BtlePlatform {
    type Link = BtleLink;

    async fn request_device(
        &self,
        filter: DeviceFilter,
        mut chosen: oneshot::Receiver<CandidateDevice>,
    ) -> Result<BtleLink, DeviceError> {
        let mut events = self.adapter.events().await.map_err(DeviceError::from_btle)?;

        // Some devices do not advertise their services, so scan unfiltered and match on the name
        info!("Scanning for {:?}...", filter.name);
        self.adapter.start_scan(ScanFilter::default()).await.map_err(DeviceError::from_btle)?;

        // devices the adapter already knows about do not produce a new discovery event
        if let Ok(peripherals) = self.adapter.peripherals().await {
            for peripheral in &peripherals {
                self.offer_peripheral(peripheral, &filter).await;
            }
        }

        let result = loop {
            tokio::select! {
                candidate = &mut chosen => {
                    break candidate.map_err(|_| DeviceError::ChooserAbandoned);
                },
                Some(event) = events.next() => {
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        _ => continue,
                    };

                    match self.adapter.peripheral(&id).await {
                        Ok(peripheral) => self.offer_peripheral(&peripheral, &filter).await,
                        Err(err) => debug!("Discovered peripheral is not available: {:?}", err),
                    }
                },
            }
        };

        // an abandoned chooser leaves the scan to the request that replaced it
        if !matches!(result, Err(DeviceError::ChooserAbandoned)) {
            if let Err(err) = self.adapter.stop_scan().await {
                warn!("Failed to stop scanning: {:?}", err);
            }
        }

        let candidate = result?;
        let peripheral = self.find_peripheral(&candidate.id).await?;

        Ok(BtleLink {
            adapter: self.adapter.clone(),
            peripheral,
            name: candidate.name,
        })
    }
}

#[derive(Clone)]
pub struct BtleLink {
    adapter: Adapter,
    peripheral: Peripheral,
    name: String,
}

impl BtleLink {
    fn characteristic(&self, characteristic: &CharacteristicRef) -> Result<Characteristic, DeviceError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or(DeviceError::MissingCharacteristic(characteristic.uuid))
    }
}

#[async_trait]
impl GattLink for BtleLink {
    fn id(&self) -> String {
        self.peripheral.id().to_string()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        self.peripheral.connect().await.map_err(DeviceError::from_btle)
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.peripheral.disconnect().await.map_err(DeviceError::from_btle)
    }

    async fn discover_services(&self) -> Result<Vec<GattService>, DeviceError> {
        self.peripheral.discover_services().await.map_err(DeviceError::from_btle)?;

        Ok(self.peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect())
    }

    async fn read(&self, characteristic: &CharacteristicRef) -> Result<Vec<u8>, DeviceError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.read(&characteristic).await.map_err(DeviceError::from_btle)
    }

    async fn write(&self, characteristic: &CharacteristicRef, data: &[u8]) -> Result<(), DeviceError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral
            .write(&characteristic, data, WriteType::WithoutResponse)
            .await
            .map_err(DeviceError::from_btle)
    }

    async fn subscribe(&self, characteristic: &CharacteristicRef) -> Result<(), DeviceError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&characteristic).await.map_err(DeviceError::from_btle)
    }

    async fn notifications(&self) -> Result<NotificationStream, DeviceError> {
        let stream = self.peripheral.notifications().await.map_err(DeviceError::from_btle)?;

        Ok(stream
            .map(|notification| Notification { uuid: notification.uuid, value: notification.value })
            .boxed())
    }

    async fn disconnected(&self) -> Result<(), DeviceError> {
        let id = self.peripheral.id();
        let mut events = self.adapter.events().await.map_err(DeviceError::from_btle)?;

        // it may have gone away before we started listening
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(disconnected_id) = event {
                if disconnected_id == id {
                    return Ok(());
                }
            }
        }

        // the adapter went away, so did the link
        Ok(())
    }
}
