use futures::channel::mpsc::Sender;
use futures::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::link::{Notification, NotificationStream};
use crate::device::session::SessionCharacteristics;
use crate::device::types::{DeviceEvent, TelemetryUpdate};
use crate::protocol::{AbPowerDecoder, BatteryDecoder};

/// Turns raw status payloads into values for the UI. Holds one decoder per metric for the
/// lifetime of a session.
pub struct TelemetrySink {
    electric: Uuid,
    ab_power: Uuid,
    battery_decoder: BatteryDecoder,
    ab_power_decoder: AbPowerDecoder,
}

impl TelemetrySink {
    pub fn new(characteristics: &SessionCharacteristics) -> Self {
        TelemetrySink {
            electric: characteristics.electric.uuid,
            ab_power: characteristics.ab_power.uuid,
            battery_decoder: BatteryDecoder::new(),
            ab_power_decoder: AbPowerDecoder::new(),
        }
    }

    /// Decodes an explicit read of the battery characteristic.
    pub fn battery_read(&mut self, data: &[u8]) -> Option<TelemetryUpdate> {
        self.battery_decoder.read(data).map(TelemetryUpdate::Battery)
    }

    pub fn on_notification(&mut self, notification: &Notification) -> Option<TelemetryUpdate> {
        if notification.uuid == self.electric {
            return self.battery_decoder.on_change(&notification.value).map(TelemetryUpdate::Battery);
        }

        if notification.uuid == self.ab_power {
            if self.ab_power_decoder.on_change(&notification.value) {
                return Some(TelemetryUpdate::Power {
                    a: self.ab_power_decoder.a_power(),
                    b: self.ab_power_decoder.b_power(),
                });
            }
            return None;
        }

        trace!("Ignoring notification from {}", notification.uuid);
        None
    }
}

/// Forwards decoded notifications to the UI until cancelled or the stream ends.
pub async fn pump_notifications(
    mut sink: TelemetrySink,
    mut notifications: NotificationStream,
    cancel: CancellationToken,
    mut events: Sender<DeviceEvent>,
) {
    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            notification = notifications.next() => {
                let Some(notification) = notification else {
                    debug!("Notification stream ended");
                    break 'mainloop;
                };

                if let Some(update) = sink.on_notification(&notification) {
                    if events.send(DeviceEvent::Telemetry(update)).await.is_err() {
                        break 'mainloop;
                    }
                }
            },
        }
    }
}

/// The latest telemetry values, as shown in the status panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub battery_percent: Option<u8>,
    pub channel_a_power: Option<u16>,
    pub channel_b_power: Option<u16>,
}

impl TelemetrySnapshot {
    pub fn apply(&mut self, update: TelemetryUpdate) {
        match update {
            TelemetryUpdate::Battery(percent) => {
                self.battery_percent = Some(percent);
            },
            TelemetryUpdate::Power { a, b } => {
                self.channel_a_power = Some(a);
                self.channel_b_power = Some(b);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::session::resolve_characteristics;
    use crate::protocol::constants::REQUIRED_SERVICES;
    use crate::device::testing::FakeLink;
    use crate::protocol::constants::{AB_POWER_CHARACTERISTIC, ELECTRIC_CHARACTERISTIC, WAVE_A_CHARACTERISTIC};
    use crate::protocol::encode_ab_power;

    async fn sink() -> TelemetrySink {
        let link = FakeLink::new("dev-1", "D-LAB ESTIM01");
        TelemetrySink::new(&resolve_characteristics(&link, &REQUIRED_SERVICES).await.unwrap())
    }

    fn notification(uuid: Uuid, value: &[u8]) -> Notification {
        Notification { uuid, value: value.to_vec() }
    }

    #[tokio::test]
    async fn battery_values() {
        let mut sink = sink().await;

        assert_eq!(sink.battery_read(&[55]), Some(TelemetryUpdate::Battery(55)));
        assert_eq!(sink.on_notification(&notification(ELECTRIC_CHARACTERISTIC, &[55])), None);
        assert_eq!(sink.on_notification(&notification(ELECTRIC_CHARACTERISTIC, &[54])), Some(TelemetryUpdate::Battery(54)));
    }

    #[tokio::test]
    async fn power_values() {
        let mut sink = sink().await;

        assert_eq!(
            sink.on_notification(&notification(AB_POWER_CHARACTERISTIC, &encode_ab_power(10, 20))),
            Some(TelemetryUpdate::Power { a: 10, b: 20 }),
        );
        assert_eq!(sink.on_notification(&notification(AB_POWER_CHARACTERISTIC, &[1])), None);
    }

    #[tokio::test]
    async fn unrelated_notifications_are_ignored() {
        let mut sink = sink().await;
        assert_eq!(sink.on_notification(&notification(WAVE_A_CHARACTERISTIC, &[1, 2, 3])), None);
    }

    #[test]
    fn snapshot_fields_update_independently() {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(TelemetryUpdate::Battery(90));
        assert_eq!(snapshot.channel_a_power, None);

        snapshot.apply(TelemetryUpdate::Power { a: 1, b: 2 });
        assert_eq!(snapshot, TelemetrySnapshot {
            battery_percent: Some(90),
            channel_a_power: Some(1),
            channel_b_power: Some(2),
        });
    }
}
