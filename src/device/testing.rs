//! In-memory stand-ins for the bluetooth stack.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::StreamExt;
use tokio::sync::watch;
use uuid::Uuid;

use crate::device::link::{BlePlatform, CharacteristicRef, DeviceFilter, GattLink, GattService, Notification, NotificationStream};
use crate::discovery::{BrokerHandle, CandidateDevice};
use crate::error::DeviceError;
use crate::protocol::constants::{
    AB_POWER_CHARACTERISTIC, DEVICE_STATUS_SERVICE, ELECTRIC_CHARACTERISTIC, ESTIM_SERVICE,
    WAVE_A_CHARACTERISTIC, WAVE_B_CHARACTERISTIC,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect,
    Disconnect,
    DiscoverServices,
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    Subscribe(Uuid),
}

pub fn full_services() -> Vec<GattService> {
    vec![
        GattService {
            uuid: DEVICE_STATUS_SERVICE,
            characteristics: vec![ELECTRIC_CHARACTERISTIC],
        },
        GattService {
            uuid: ESTIM_SERVICE,
            characteristics: vec![AB_POWER_CHARACTERISTIC, WAVE_A_CHARACTERISTIC, WAVE_B_CHARACTERISTIC],
        },
    ]
}

struct FakeLinkInner {
    id: String,
    name: String,
    services: Vec<GattService>,
    fail_connect: bool,
    battery: u8,
    ops: Mutex<Vec<Op>>,
    notify_sender: UnboundedSender<Notification>,
    notify_receiver: Mutex<Option<UnboundedReceiver<Notification>>>,
    dropped: watch::Sender<bool>,
}

/// Records every operation. A requested disconnect drops the link, like a real device would.
#[derive(Clone)]
pub struct FakeLink {
    inner: Arc<FakeLinkInner>,
}

impl FakeLink {
    pub fn new(id: &str, name: &str) -> Self {
        Self::build(id, name, full_services(), false)
    }

    pub fn with_services(id: &str, name: &str, services: Vec<GattService>) -> Self {
        Self::build(id, name, services, false)
    }

    pub fn failing_connect(id: &str, name: &str) -> Self {
        Self::build(id, name, full_services(), true)
    }

    fn build(id: &str, name: &str, services: Vec<GattService>, fail_connect: bool) -> Self {
        let (notify_sender, notify_receiver) = unbounded();
        let (dropped, _) = watch::channel(false);

        FakeLink {
            inner: Arc::new(FakeLinkInner {
                id: id.to_string(),
                name: name.to_string(),
                services,
                fail_connect,
                battery: 87,
                ops: Mutex::new(Vec::new()),
                notify_sender,
                notify_receiver: Mutex::new(Some(notify_receiver)),
                dropped,
            }),
        }
    }

    fn record(&self, op: Op) {
        self.inner.ops.lock().unwrap().push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.inner.ops.lock().unwrap().clone()
    }

    pub fn writes_to(&self, uuid: Uuid) -> Vec<Vec<u8>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write(target, data) if target == uuid => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, op: &Op) -> usize {
        self.ops().iter().filter(|recorded| *recorded == op).count()
    }

    pub fn battery(&self) -> u8 {
        self.inner.battery
    }

    /// Delivers a value change notification.
    pub fn notify(&self, uuid: Uuid, value: &[u8]) {
        let _ = self.inner.notify_sender.unbounded_send(Notification { uuid, value: value.to_vec() });
    }

    /// Simulates the device going away on its own.
    pub fn drop_link(&self) {
        self.inner.dropped.send_replace(true);
    }
}

#[async_trait]
impl GattLink for FakeLink {
    fn id(&self) -> String {
        self.inner.id.clone()
    }

    fn name(&self) -> String {
        self.inner.name.clone()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        self.record(Op::Connect);
        if self.inner.fail_connect {
            return Err(DeviceError::ConnectFailure { reason: "out of range".to_string() });
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.record(Op::Disconnect);
        self.drop_link();
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService>, DeviceError> {
        self.record(Op::DiscoverServices);
        Ok(self.inner.services.clone())
    }

    async fn read(&self, characteristic: &CharacteristicRef) -> Result<Vec<u8>, DeviceError> {
        self.record(Op::Read(characteristic.uuid));
        Ok(vec![self.inner.battery])
    }

    async fn write(&self, characteristic: &CharacteristicRef, data: &[u8]) -> Result<(), DeviceError> {
        self.record(Op::Write(characteristic.uuid, data.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, characteristic: &CharacteristicRef) -> Result<(), DeviceError> {
        self.record(Op::Subscribe(characteristic.uuid));
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, DeviceError> {
        let receiver = self.inner.notify_receiver.lock().unwrap().take();
        match receiver {
            Some(receiver) => Ok(receiver.boxed()),
            None => Ok(futures::stream::empty().boxed()),
        }
    }

    async fn disconnected(&self) -> Result<(), DeviceError> {
        let mut dropped = self.inner.dropped.subscribe();
        let _ = dropped.wait_for(|dropped| *dropped).await.map(|_| ());
        Ok(())
    }
}

/// Offers every known link whose name passes the filter.
pub struct FakePlatform {
    broker: BrokerHandle,
    links: Mutex<HashMap<String, FakeLink>>,
    deny_permission: bool,
    // the chosen device disappears before the chooser can hand it over
    lose_chosen: bool,
}

impl FakePlatform {
    pub fn new(broker: BrokerHandle, links: Vec<FakeLink>) -> Self {
        FakePlatform {
            broker,
            links: Mutex::new(links.into_iter().map(|link| (link.id(), link)).collect()),
            deny_permission: false,
            lose_chosen: false,
        }
    }

    pub fn losing_chosen_device(broker: BrokerHandle, links: Vec<FakeLink>) -> Self {
        FakePlatform {
            lose_chosen: true,
            ..FakePlatform::new(broker, links)
        }
    }

    pub fn denying_permission(broker: BrokerHandle) -> Self {
        FakePlatform {
            broker,
            links: Mutex::new(HashMap::new()),
            deny_permission: true,
            lose_chosen: false,
        }
    }
}

#[async_trait]
impl BlePlatform for FakePlatform {
    type Link = FakeLink;

    async fn request_device(
        &self,
        filter: DeviceFilter,
        chosen: oneshot::Receiver<CandidateDevice>,
    ) -> Result<FakeLink, DeviceError> {
        if self.deny_permission {
            return Err(DeviceError::PermissionDenied);
        }

        let offered: Vec<CandidateDevice> = self.links.lock().unwrap()
            .values()
            .filter(|link| filter.matches(Some(link.name().as_str())))
            .map(|link| CandidateDevice::new(link.id(), link.name()))
            .collect();
        for candidate in offered {
            self.broker.register_candidate(candidate).await?;
        }

        let candidate = chosen.await.map_err(|_| DeviceError::ChooserAbandoned)?;
        if self.lose_chosen {
            return Err(DeviceError::ChooserFailed { reason: format!("device {} is gone", candidate.id) });
        }
        let link = self.links.lock().unwrap().get(&candidate.id).cloned();
        link.ok_or_else(|| DeviceError::ChooserFailed { reason: "unknown device".to_string() })
    }
}
