use futures::channel::mpsc::Sender;
use futures::SinkExt;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::device::types::{ConnectionState, DeviceEvent};
use crate::discovery::broker::BrokerHandle;
use crate::discovery::types::sort_candidates;

async fn left_disconnected(state: &mut watch::Receiver<ConnectionState>) {
    // an error means the controller is gone, which also ends discovery
    let _ = state.wait_for(|state| *state != ConnectionState::Disconnected).await.map(|_| ());
}

/// Pulls the candidate list from the broker every `interval` and sends it, sorted, to the UI.
///
/// Runs for as long as the connection state stays `Disconnected` and `cancel` is not cancelled.
pub async fn poll_candidates(
    broker: BrokerHandle,
    mut state: watch::Receiver<ConnectionState>,
    interval: Duration,
    cancel: CancellationToken,
    mut events: Sender<DeviceEvent>,
) {
    info!("Polling for candidates");

    'mainloop: loop {
        if cancel.is_cancelled() {
            break 'mainloop;
        }

        let current = *state.borrow_and_update();
        if current != ConnectionState::Disconnected {
            break 'mainloop;
        }

        match broker.pull_devices().await {
            Ok(mut candidates) => {
                sort_candidates(&mut candidates);
                if events.send(DeviceEvent::Candidates(candidates)).await.is_err() {
                    break 'mainloop;
                }
            },
            Err(err) => {
                warn!("Failed to pull candidates: {}", err);
                break 'mainloop;
            },
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            _ = left_disconnected(&mut state) => {
                break 'mainloop;
            },
            _ = sleep(interval) => {},
        }
    }

    debug!("Stopped polling for candidates");
}
