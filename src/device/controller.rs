use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use futures::channel::mpsc::{channel, unbounded, Sender, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use iced::subscription::{self, Subscription};
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::device::constants::{COMMAND_CHANNEL_SIZE, EVENT_CHANNEL_SIZE, SCAN_POLL_DELAY, WAVE_TICK_DELAY};
use crate::device::link::{BlePlatform, DeviceFilter, GattLink};
use crate::device::platform::{default_adapter, BtlePlatform};
use crate::device::session::{resolve_characteristics, Session};
use crate::device::streamer::{stream_channel, wave_target};
use crate::device::strength::Channels;
use crate::device::telemetry::{pump_notifications, TelemetrySink};
use crate::device::types::{Channel, ConnectionState, DeviceEvent};
use crate::discovery::{broker_task, poll_candidates, BrokerHandle};
use crate::error::DeviceError;
use crate::protocol::constants::{DEVICE_NAME, REQUIRED_SERVICES};
use crate::protocol::{encode_ab_power, BasicWave};

#[derive(Debug, Clone)]
pub enum DeviceCommand {
    /// Starts a discovery round. A round that is still running is replaced.
    Scan,
    /// Connects to the candidate with this id.
    Select(String),
    Disconnect,
    SetStrength(Channel, i64),
    SelectWave(Channel, Option<BasicWave>),
    /// Leaves the device idle, disconnects and stops the controller. Answered with
    /// [`DeviceEvent::Stopped`].
    Shutdown,
}

/// Used by the UI to send commands to the controller task.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    sender: Sender<DeviceCommand>,
}

impl ControllerHandle {
    #[cfg(test)]
    pub fn detached() -> (Self, futures::channel::mpsc::Receiver<DeviceCommand>) {
        let (sender, receiver) = channel(COMMAND_CHANNEL_SIZE);
        (ControllerHandle { sender }, receiver)
    }

    /// Returns false if the controller is no longer running.
    pub fn send(&self, command: DeviceCommand) -> bool {
        // every sender clone has a guaranteed slot, so this only fails if the receiver is gone
        let mut sender = self.sender.clone();
        match sender.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to send command to the device controller: {:?}", err);
                false
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub filter: DeviceFilter,
    pub scan_poll_interval: Duration,
    pub wave_tick_interval: Duration,
    pub wave_a: Option<BasicWave>,
    pub wave_b: Option<BasicWave>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            filter: DeviceFilter {
                name: DEVICE_NAME.to_string(),
                services: REQUIRED_SERVICES.to_vec(),
            },
            scan_poll_interval: Duration::from_millis(SCAN_POLL_DELAY),
            wave_tick_interval: Duration::from_millis(WAVE_TICK_DELAY),
            wave_a: None,
            wave_b: None,
        }
    }
}

/// Events produced by tasks that belong to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LinkDropped { session: u64 },
}

#[derive(Clone)]
enum ChooserSlot<L> {
    Pending,
    Ready(L),
    Failed(String),
}

struct DiscoveryRound<L> {
    cancel: CancellationToken,
    slot: watch::Receiver<ChooserSlot<L>>,
    // set once the user picked a candidate, failures are then reported by the connection attempt
    selected: Arc<AtomicBool>,
}

/// Owns the connection state machine and, while connected, the session.
pub struct Controller<P: BlePlatform> {
    platform: Arc<P>,
    broker: BrokerHandle,
    settings: ControllerSettings,
    cancel: CancellationToken,
    events: Sender<DeviceEvent>,
    session_events: UnboundedSender<SessionEvent>,
    state: watch::Sender<ConnectionState>,
    discovery: Option<DiscoveryRound<P::Link>>,
    channels: Channels,
    session: Option<Session<P::Link>>,
    last_session_id: u64,
}

impl<P: BlePlatform> Controller<P> {
    pub fn new(
        platform: Arc<P>,
        broker: BrokerHandle,
        settings: ControllerSettings,
        cancel: CancellationToken,
        events: Sender<DeviceEvent>,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (session_events, session_receiver) = unbounded();
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let mut channels = Channels::new();
        channels.select_wave(Channel::A, settings.wave_a);
        channels.select_wave(Channel::B, settings.wave_b);

        let controller = Controller {
            platform,
            broker,
            settings,
            cancel,
            events,
            session_events,
            state,
            discovery: None,
            channels,
            session: None,
            last_session_id: 0,
        };

        (controller, session_receiver)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    async fn emit(&mut self, event: DeviceEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Nobody is listening for device events");
        }
    }

    async fn notice(&mut self, message: String) {
        self.emit(DeviceEvent::Notice(message)).await;
    }

    async fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Connection state {:?} -> {:?}", previous, state);
            self.emit(DeviceEvent::StateChange(state)).await;
        }
    }

    pub async fn handle_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Scan => self.scan().await,
            DeviceCommand::Select(id) => {
                // failures have been reported to the user already
                let _ = self.connect(&id).await;
            },
            DeviceCommand::Disconnect => self.disconnect().await,
            DeviceCommand::SetStrength(channel, input) => self.set_strength(channel, input).await,
            DeviceCommand::SelectWave(channel, wave) => self.select_wave(channel, wave),
            DeviceCommand::Shutdown => self.shutdown().await,
        }
    }

    pub async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LinkDropped { session } => self.on_link_dropped(session).await,
        }
    }

    /// Opens a device chooser and starts polling the broker for candidates.
    pub async fn scan(&mut self) {
        let state = self.state();
        if state != ConnectionState::Disconnected {
            warn!("Ignoring scan request while {:?}", state);
            return;
        }

        if let Some(round) = self.discovery.take() {
            info!("Restarting discovery");
            round.cancel.cancel();
        }

        // opened here rather than in the chooser task, so the latest scan always owns the chooser
        let chosen = match self.broker.open_chooser().await {
            Ok(chosen) => chosen,
            Err(err) => {
                error!("Failed to open a device chooser: {}", err);
                self.notice(format!("Failed to scan for devices: {}", err)).await;
                return;
            },
        };

        let cancel = self.cancel.child_token();
        let (slot_sender, slot) = watch::channel(ChooserSlot::Pending);
        let selected = Arc::new(AtomicBool::new(false));

        let platform = self.platform.clone();
        let filter = self.settings.filter.clone();
        let chooser_cancel = cancel.clone();
        let chooser_selected = selected.clone();
        let mut events = self.events.clone();
        spawn(async move {
            match platform.request_device(filter, chosen).await {
                Ok(link) => {
                    info!("Device chooser resolved with {} ({})", link.name(), link.id());
                    slot_sender.send_replace(ChooserSlot::Ready(link));
                },
                Err(DeviceError::ChooserAbandoned) => {
                    debug!("Device chooser was replaced");
                    slot_sender.send_replace(ChooserSlot::Failed(DeviceError::ChooserAbandoned.to_string()));
                },
                Err(err) => {
                    error!("Device request failed: {}", err);
                    slot_sender.send_replace(ChooserSlot::Failed(err.to_string()));
                    // no retry, the user has to start a new scan
                    chooser_cancel.cancel();
                    if chooser_selected.load(Ordering::SeqCst) {
                        debug!("Leaving the report to the connection attempt");
                    } else {
                        let _ = events.send(DeviceEvent::Notice(format!("Failed to scan for devices: {}", err))).await;
                    }
                },
            }
        });

        spawn(poll_candidates(
            self.broker.clone(),
            self.state.subscribe(),
            self.settings.scan_poll_interval,
            cancel.clone(),
            self.events.clone(),
        ));

        self.discovery = Some(DiscoveryRound { cancel, slot, selected });
    }

    async fn wait_for_chooser(mut slot: watch::Receiver<ChooserSlot<P::Link>>) -> Result<P::Link, DeviceError> {
        let outcome = slot
            .wait_for(|slot| !matches!(slot, ChooserSlot::Pending))
            .await
            .map(|slot| (*slot).clone());

        match outcome {
            Ok(ChooserSlot::Ready(link)) => Ok(link),
            Ok(ChooserSlot::Failed(reason)) => Err(DeviceError::ChooserFailed { reason }),
            Ok(ChooserSlot::Pending) | Err(_) => Err(DeviceError::ChooserFailed {
                reason: "the device request ended without a device".to_string(),
            }),
        }
    }

    /// Resolves the pending chooser with `id` and connects to the chosen device.
    ///
    /// Errors are reported to the user before they are returned. A failed attempt leaves the
    /// controller disconnected without a session.
    pub async fn connect(&mut self, id: &str) -> Result<(), DeviceError> {
        let state = self.state();
        if state != ConnectionState::Disconnected {
            warn!("Ignoring selection of {} while {:?}", id, state);
            return Ok(());
        }

        if let Some(round) = &self.discovery {
            round.selected.store(true, Ordering::SeqCst);
        }

        if let Err(err) = self.broker.select_device(id).await {
            if let Some(round) = &self.discovery {
                round.selected.store(false, Ordering::SeqCst);
            }
            if err.is_callback_misuse() {
                error!("Selection of {} does not match the device chooser: {}", id, err);
            } else {
                error!("Failed to select device {}: {}", id, err);
            }
            self.notice(format!("Failed to select device: {}", err)).await;
            return Err(err.into());
        }

        self.set_state(ConnectionState::Connecting).await;

        let link = match self.discovery.take() {
            Some(round) => {
                round.cancel.cancel();
                Self::wait_for_chooser(round.slot).await
            },
            None => Err(DeviceError::ChooserFailed { reason: "no device request is running".to_string() }),
        };

        let link = match link {
            Ok(link) => link,
            Err(err) => return self.fail_attempt(None, err).await,
        };

        match self.open_session(link.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => self.fail_attempt(Some(link), err).await,
        }
    }

    async fn fail_attempt(&mut self, link: Option<P::Link>, err: DeviceError) -> Result<(), DeviceError> {
        error!("Connection attempt failed: {}", err);

        if let Some(session) = self.session.take() {
            session.release();
        }

        if let Some(link) = link {
            if let Err(err) = link.disconnect().await {
                debug!("Failed to disconnect after failed attempt: {}", err);
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        self.notice(format!("Failed to connect: {}", err)).await;
        Err(err)
    }

    async fn open_session(&mut self, link: P::Link) -> Result<(), DeviceError> {
        info!("Connecting to {} ({})...", link.name(), link.id());
        link.connect().await.map_err(|err| match err {
            DeviceError::ConnectFailure { .. } => err,
            other => DeviceError::ConnectFailure { reason: other.to_string() },
        })?;

        let characteristics = resolve_characteristics(&link, &self.settings.filter.services).await?;

        self.last_session_id += 1;
        let mut session = Session::new(self.last_session_id, link.clone(), characteristics, &self.cancel);

        // Reports the link going away, whether requested or not. Teardown happens in response.
        let session_id = session.id();
        let watcher_link = link.clone();
        let watcher_cancel = session.cancel_token();
        let session_events = self.session_events.clone();
        session.spawn(async move {
            tokio::select! {
                biased;
                _ = watcher_cancel.cancelled() => {},
                result = watcher_link.disconnected() => {
                    if let Err(err) = result {
                        warn!("Lost track of the device connection: {}", err);
                    }
                    let _ = session_events.unbounded_send(SessionEvent::LinkDropped { session: session_id });
                },
            }
        });

        self.session = Some(session);
        self.set_state(ConnectionState::Connected).await;
        self.emit(DeviceEvent::Connected { id: link.id(), name: link.name() }).await;

        // taken before subscribing, so that nothing the device sends is missed
        let notifications = link.notifications().await?;
        link.subscribe(&characteristics.electric).await?;
        link.subscribe(&characteristics.ab_power).await?;

        let mut sink = TelemetrySink::new(&characteristics);
        let battery = link.read(&characteristics.electric).await?;
        if let Some(update) = sink.battery_read(&battery) {
            self.emit(DeviceEvent::Telemetry(update)).await;
        }

        // bring the device to a known idle state before any user input is sent
        self.channels.reset_strengths();
        link.write(&characteristics.ab_power, &encode_ab_power(0, 0)).await?;
        for channel in Channel::BOTH {
            self.emit(DeviceEvent::StrengthCommitted { channel, value: 0 }).await;
        }

        let events = self.events.clone();
        let period = self.settings.wave_tick_interval;
        let session = self.session.as_mut().ok_or(DeviceError::NotConnected)?;
        let token = session.cancel_token();

        session.spawn(pump_notifications(sink, notifications, token.clone(), events));

        for channel in Channel::BOTH {
            session.spawn(stream_channel(
                channel,
                link.clone(),
                wave_target(channel, &characteristics),
                self.channels.get(channel).wave_center(),
                period,
                token.clone(),
            ));
        }

        info!("Device ready");
        Ok(())
    }

    /// Asks the device to disconnect. The session is torn down once the link reports that it is
    /// gone. Repeated requests while disconnecting are ignored.
    pub async fn disconnect(&mut self) {
        match self.state() {
            ConnectionState::Connected => {},
            ConnectionState::Disconnecting => {
                info!("Disconnect already requested");
                return;
            },
            state => {
                warn!("Ignoring disconnect request while {:?}", state);
                return;
            },
        }

        let Some(link) = self.session.as_ref().map(|session| session.link().clone()) else {
            warn!("Connected without a session");
            return;
        };

        self.set_state(ConnectionState::Disconnecting).await;

        if let Err(err) = link.disconnect().await {
            // the device is unreachable either way
            warn!("Disconnect request failed: {}", err);
            self.teardown().await;
        }
    }

    async fn on_link_dropped(&mut self, session_id: u64) {
        match &self.session {
            Some(session) if session.id() == session_id => {},
            _ => {
                debug!("Ignoring link drop of session {}", session_id);
                return;
            },
        }

        if self.state() == ConnectionState::Connected {
            info!("Device disconnected");
        }
        self.teardown().await;
    }

    /// Releases the session and returns to `Disconnected`. Safe to call more than once.
    async fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("Session already torn down");
            return;
        };

        session.release();
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Clamps and commits the strength of one channel, then sends the combined power command
    /// right away.
    pub async fn set_strength(&mut self, channel: Channel, input: i64) {
        let value = self.channels.commit_strength(channel, input);
        self.emit(DeviceEvent::StrengthCommitted { channel, value }).await;

        if self.state() != ConnectionState::Connected {
            debug!("Not connected; strength {} of channel {} is not sent", value, channel);
            return;
        }

        if let Some(session) = &self.session {
            let command = self.channels.power_command();
            if let Err(err) = session.link().write(&session.characteristics().ab_power, &command).await {
                warn!("Failed to write strength: {}", err);
            }
        }
    }

    pub fn select_wave(&mut self, channel: Channel, wave: Option<BasicWave>) {
        info!("Channel {} wave: {:?}", channel, wave);
        self.channels.select_wave(channel, wave);
    }

    /// Leaves the device idle and disconnected.
    pub async fn shutdown(&mut self) {
        if let Some(round) = self.discovery.take() {
            round.cancel.cancel();
        }

        let Some(session) = self.session.take() else {
            return;
        };

        let link = session.link().clone();
        let ab_power = session.characteristics().ab_power;
        session.release();

        if let Err(err) = link.write(&ab_power, &encode_ab_power(0, 0)).await {
            warn!("Failed to reset strength on shutdown: {}", err);
        }
        if let Err(err) = link.disconnect().await {
            warn!("Failed to disconnect on shutdown: {}", err);
        }
    }
}

/// Runs a controller until `cancel` is cancelled or it is told to shut down. The first event is
/// [`DeviceEvent::Ready`] and the last one is [`DeviceEvent::Stopped`].
pub async fn run_controller<P: BlePlatform>(
    platform: Arc<P>,
    broker: BrokerHandle,
    settings: ControllerSettings,
    cancel: CancellationToken,
    mut events: Sender<DeviceEvent>,
) {
    let (command_sender, mut commands) = channel::<DeviceCommand>(COMMAND_CHANNEL_SIZE);
    let (mut controller, mut session_events) = Controller::new(
        platform,
        broker,
        settings,
        cancel.clone(),
        events.clone(),
    );

    if events.send(DeviceEvent::Ready(ControllerHandle { sender: command_sender })).await.is_err() {
        return;
    }

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            command = commands.next() => {
                match command {
                    None | Some(DeviceCommand::Shutdown) => break 'mainloop,
                    Some(command) => controller.handle_command(command).await,
                }
            },
            Some(event) = session_events.next() => {
                controller.handle_session_event(event).await;
            },
        }
    }

    info!("Stopping device controller");
    controller.shutdown().await;
    let _ = events.send(DeviceEvent::Stopped).await;
}

async fn run_bluetooth(cancel: CancellationToken, settings: ControllerSettings, mut events: Sender<DeviceEvent>) {
    let adapter = match default_adapter().await {
        Ok(adapter) => adapter,
        Err(err) => {
            error!("Bluetooth is not available: {}", err);
            let _ = events.send(DeviceEvent::Notice(format!("Bluetooth is not available: {}", err))).await;
            return;
        },
    };

    // the controller may stop before the application does
    let broker_cancel = cancel.child_token();
    let (broker, broker_handle) = broker_task(broker_cancel.clone());
    let platform = Arc::new(BtlePlatform::new(adapter, broker.clone()));

    run_controller(platform, broker, settings, cancel, events).await;
    broker_cancel.cancel();

    if let Err(err) = broker_handle.await {
        warn!("Broker task failed: {:?}", err);
    }
}

pub fn controller_subscription(cancel: CancellationToken, settings: ControllerSettings) -> Subscription<DeviceEvent> {
    struct DeviceController;

    subscription::channel(
        std::any::TypeId::of::<DeviceController>(),
        EVENT_CHANNEL_SIZE,
        move |events| {
            async move {
                run_bluetooth(cancel, settings, events).await;

                // note: subscription::channel expects the future to never resolve (Infallible)
                futures::future::pending::<Infallible>().await
            }
        },
    )
}
