use std::sync::PoisonError;
use log::{trace, warn};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::link::{CharacteristicRef, GattLink};
use crate::device::session::SessionCharacteristics;
use crate::device::strength::SharedWaveCenter;
use crate::device::types::Channel;

/// The characteristic that carries the wave frames of `channel`.
///
/// The firmware crosses these over: output channel A is driven through the characteristic it
/// labels "B", and channel B through "A".
pub fn wave_target(channel: Channel, characteristics: &SessionCharacteristics) -> CharacteristicRef {
    match channel {
        Channel::A => characteristics.wave_b,
        Channel::B => characteristics.wave_a,
    }
}

/// Ticks the wave generator of one channel every `period` and writes each produced frame to
/// `target`. A tick without a frame writes nothing.
pub async fn stream_channel<L: GattLink>(
    channel: Channel,
    link: L,
    target: CharacteristicRef,
    wave_center: SharedWaveCenter,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately, the first frame is due after one period
    ticker.tick().await;

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            _ = ticker.tick() => {
                let frame = wave_center.lock().unwrap_or_else(PoisonError::into_inner).tick();

                if let Some(frame) = frame {
                    trace!("Channel {} frame {:02x?}", channel, frame);
                    if let Err(err) = link.write(&target, &frame).await {
                        warn!("Failed to write wave frame for channel {}: {}", channel, err);
                    }
                }
            },
        }
    }
}
