use std::future::Future;
use log::{debug, info};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::link::{CharacteristicRef, GattLink, GattService};
use crate::protocol::constants::{
    AB_POWER_CHARACTERISTIC, DEVICE_STATUS_SERVICE, ELECTRIC_CHARACTERISTIC, ESTIM_SERVICE,
    WAVE_A_CHARACTERISTIC, WAVE_B_CHARACTERISTIC,
};
use crate::error::DeviceError;

/// The characteristics a session drives, labeled the way the firmware labels them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCharacteristics {
    pub electric: CharacteristicRef,
    pub ab_power: CharacteristicRef,
    pub wave_a: CharacteristicRef,
    pub wave_b: CharacteristicRef,
}

fn find_service(services: &[GattService], uuid: Uuid) -> Result<&GattService, DeviceError> {
    services
        .iter()
        .find(|service| service.uuid == uuid)
        .ok_or(DeviceError::MissingService(uuid))
}

fn find_characteristic(service: &GattService, uuid: Uuid) -> Result<CharacteristicRef, DeviceError> {
    if service.characteristics.contains(&uuid) {
        Ok(CharacteristicRef { service: service.uuid, uuid })
    } else {
        Err(DeviceError::MissingCharacteristic(uuid))
    }
}

/// Checks that every service in `required` is exposed, then resolves the characteristics we
/// need from the device status and e-stim services.
pub async fn resolve_characteristics<L: GattLink>(
    link: &L,
    required: &[Uuid],
) -> Result<SessionCharacteristics, DeviceError> {
    info!("Discovering services...");
    let services = link.discover_services().await?;

    for uuid in required {
        find_service(&services, *uuid)?;
    }

    let device_status = find_service(&services, DEVICE_STATUS_SERVICE)?;
    let estim = find_service(&services, ESTIM_SERVICE)?;

    Ok(SessionCharacteristics {
        electric: find_characteristic(device_status, ELECTRIC_CHARACTERISTIC)?,
        ab_power: find_characteristic(estim, AB_POWER_CHARACTERISTIC)?,
        wave_a: find_characteristic(estim, WAVE_A_CHARACTERISTIC)?,
        wave_b: find_characteristic(estim, WAVE_B_CHARACTERISTIC)?,
    })
}

/// Everything that belongs to one connected device. Tasks spawned through the session are
/// cancelled when it is released (or dropped), so none of them outlive it.
pub struct Session<L: GattLink> {
    id: u64,
    link: L,
    characteristics: SessionCharacteristics,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<L: GattLink> Session<L> {
    pub fn new(id: u64, link: L, characteristics: SessionCharacteristics, parent: &CancellationToken) -> Self {
        Session {
            id,
            link,
            characteristics,
            cancel: parent.child_token(),
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn characteristics(&self) -> &SessionCharacteristics {
        &self.characteristics
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(spawn(future));
    }

    /// Stops all session tasks and lets go of the device handles.
    pub fn release(self) {
        info!("Releasing session {} ({})", self.id, self.link.id());
        // the rest happens in drop
    }
}

impl<L: GattLink> Drop for Session<L> {
    fn drop(&mut self) {
        self.cancel.cancel();
        debug!("Session {} stopped {} tasks", self.id, self.tasks.len());
        self.tasks.clear();
    }
}
