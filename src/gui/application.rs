use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::theme::{self, Theme};
use iced::time::{every as iced_time_every};
use iced::widget::{
    Column, PickList, button, column, container, horizontal_rule, row, text, text_input,
};
use std::time::Duration;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::constants::SHUTDOWN_TIMEOUT;
use crate::device::controller::{controller_subscription, ControllerHandle, DeviceCommand};
use crate::device::strength::parse_strength;
use crate::device::types::{Channel, DeviceEvent};
use crate::error::AppRunError;
use crate::gui::types::{DeviceView, Message, WaveChoice, WAVE_CHOICES};

pub struct ApplicationFlags {
    config_io: ConfigIO,
}

pub struct MyApplication {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,

    // messages that the user must click away
    notices: Vec<String>,

    // current config, might not be saved to disk yet
    config_io: ConfigIO,
    config: Config,
    config_loaded: bool,
    config_dirty: bool,
    // this flag is used to make sure that a user is not spammed with save configuration errors
    displayed_config_save_error: bool,

    // None until the device controller is running
    controller: Option<ControllerHandle>,
    device: DeviceView,
    strength_input_a: String,
    strength_input_b: String,

    // set while the window waits for the controller to leave the device idle
    closing: Option<window::Id>,
}

impl MyApplication {
    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }

    fn request_close(&mut self, id: window::Id) -> Command<Message> {
        if self.closing.is_some() {
            debug!("Already waiting for the device controller to stop");
            return Command::none();
        }

        let shutdown_sent = match &self.controller {
            Some(controller) => controller.send(DeviceCommand::Shutdown),
            None => false,
        };
        if !shutdown_sent {
            return self.finish_close(id);
        }

        info!("Waiting for the device controller to stop");
        self.closing = Some(id);
        Command::perform(
            async { tokio::time::sleep(Duration::from_millis(SHUTDOWN_TIMEOUT)).await },
            |_| Message::ShutdownTimedOut,
        )
    }

    fn finish_close(&mut self, id: window::Id) -> Command<Message> {
        self.closing = None;
        self.before_close();
        window::close(id)
    }

    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    let mut error_message: Option<String> = None;

                    if err.is_file_not_found_error() {
                        info!("Config file not found, using defaults");
                    } else {
                        error!("Failed to load config: {:?}", &err);
                        error_message = Some(format!("Failed to load config: {}", &err));
                    }
                    (Config::default(), error_message)
                }
            }
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn save_config(&self) -> Command<Message> {
        let config = self.config.clone();
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.save(config).await {
                Ok(_) => None,
                Err(err) => {
                    error!("Failed to save config: {:?}", &err);
                    Some(format!("Failed to save config: {}", &err))
                },
            }
        };

        Command::perform(fut, Message::ConfigSaveComplete)
    }

    fn send_command(&mut self, command: DeviceCommand) {
        match &self.controller {
            Some(controller) => {
                if !controller.send(command) {
                    self.notices.push("The device controller has stopped".to_string());
                }
            },
            None => warn!("Device controller is not running yet, dropping {:?}", command),
        }
    }

    fn strength_input_mut(&mut self, channel: Channel) -> &mut String {
        match channel {
            Channel::A => &mut self.strength_input_a,
            Channel::B => &mut self.strength_input_b,
        }
    }

    fn strength_input(&self, channel: Channel) -> &str {
        match channel {
            Channel::A => &self.strength_input_a,
            Channel::B => &self.strength_input_b,
        }
    }

    fn on_device_event(&mut self, event: DeviceEvent) -> Command<Message> {
        self.device.apply(&event);

        match event {
            DeviceEvent::Ready(handle) => {
                info!("Device controller ready");
                self.controller = Some(handle);
            },
            DeviceEvent::Notice(message) => {
                self.notices.push(message);
            },
            DeviceEvent::StrengthCommitted { channel, value } => {
                *self.strength_input_mut(channel) = value.to_string();
            },
            DeviceEvent::Stopped => {
                info!("Device controller stopped");
                self.controller = None;
                if let Some(id) = self.closing {
                    return self.finish_close(id);
                }
            },
            _ => {},
        }

        Command::none()
    }
}

impl Application for MyApplication {
    type Executor = iced::executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (MyApplication, Command<Self::Message>) {
        let app = MyApplication {
            app_cancel: CancellationToken::new(),
            notices: Vec::new(),
            config_io: flags.config_io,
            config: Config::default(),
            config_loaded: false,
            config_dirty: false,
            displayed_config_save_error: false,
            controller: None,
            device: DeviceView::default(),
            strength_input_a: "0".to_string(),
            strength_input_b: "0".to_string(),
            closing: None,
        };

        let command = app.load_config();
        (app, command)
    }

    fn title(&self) -> String {
        String::from(concat!("DG-LAB Link ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                self.config = config;
                self.config_loaded = true;
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }
            },
            Message::ApplyDirtyConfig => {
                if self.config_dirty {
                    self.config_dirty = false;
                    return self.save_config();
                }
            },
            Message::ConfigSaveComplete(error_message) => {
                if !self.displayed_config_save_error {
                    if let Some(error_message) = error_message {
                        self.displayed_config_save_error = true;
                        self.notices.push(error_message);
                    }
                }
            },
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                }
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                return self.request_close(id);
            },
            Message::ShutdownTimedOut => {
                if let Some(id) = self.closing {
                    warn!("Device controller did not stop in time, closing anyway");
                    return self.finish_close(id);
                }
            },
            Message::EventOccurred(_) => {},
            Message::DeviceEvent(event) => {
                return self.on_device_event(event);
            },
            Message::Scan => {
                self.send_command(DeviceCommand::Scan);
            },
            Message::SelectCandidate(id) => {
                self.send_command(DeviceCommand::Select(id));
            },
            Message::Disconnect => {
                self.send_command(DeviceCommand::Disconnect);
            },
            Message::StrengthInput(channel, value) => {
                *self.strength_input_mut(channel) = value;
            },
            Message::StrengthSubmit(channel) => {
                match parse_strength(self.strength_input(channel)) {
                    Some(value) => self.send_command(DeviceCommand::SetStrength(channel, i64::from(value))),
                    None => {
                        // not a number, the value is not changed
                        *self.strength_input_mut(channel) = self.device.strength(channel).to_string();
                    },
                }
            },
            Message::WaveSelected(channel, WaveChoice(wave)) => {
                self.config.set_wave(channel, wave);
                self.config_dirty = true;
                self.send_command(DeviceCommand::SelectWave(channel, wave));
            },
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            event::listen().map(Message::EventOccurred),
            iced_time_every(Duration::from_secs(1)).map(|_| Message::ApplyDirtyConfig),
        ];

        // the controller is configured from the config file, so it starts once that is loaded
        if self.config_loaded {
            subscriptions.push(
                controller_subscription(self.app_cancel.clone(), self.config.to_settings())
                    .map(Message::DeviceEvent)
            );
        }

        Subscription::batch(subscriptions)
    }

    fn view(&self) -> Element<Message> {
        if let Some(notice) = self.notices.first() {
            return container(
                column![
                    text(notice),

                    button(text("Okay"))
                        .on_press(Message::NoticeConfirmed),

                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        let affordances = self.device.affordances();
        let mut content = Column::new()
            .spacing(20)
            .width(Length::Fill)
            .align_items(Alignment::Center);

        content = content.push(text(self.device.status_message()));

        if affordances.scan {
            let label = if self.device.candidates.is_empty() { "Scan" } else { "Rescan" };
            let mut scan_button = button(text(label)).style(theme::Button::Primary);
            if self.controller.is_some() {
                scan_button = scan_button.on_press(Message::Scan);
            }
            content = content.push(scan_button);
        }

        if affordances.candidate_list && !self.device.candidates.is_empty() {
            content = content.push(horizontal_rule(10));
            content = content.push(
                Column::with_children(
                    self.device.candidates
                        .iter()
                        .map(|candidate| {
                            row![
                                text(format!("{} ({})", candidate.name, candidate.id)).width(Length::Fill),
                                button(text("Select"))
                                    .on_press(Message::SelectCandidate(candidate.id.clone())),
                            ]
                            .align_items(Alignment::Center)
                            .spacing(20)
                        })
                        .map(Element::from)
                )
                    .spacing(10)
                    .width(Length::Fill),
            );
        }

        if affordances.status_panel {
            let telemetry = self.device.telemetry;
            let or_unknown = |value: Option<String>| value.unwrap_or_else(|| "–".to_string());

            content = content.push(horizontal_rule(10));
            content = content.push(
                row![
                    text(format!("Battery: {}", or_unknown(telemetry.battery_percent.map(|v| format!("{}%", v))))),
                    text(format!("A: {}", or_unknown(telemetry.channel_a_power.map(|v| v.to_string())))),
                    text(format!("B: {}", or_unknown(telemetry.channel_b_power.map(|v| v.to_string())))),
                ].spacing(30)
            );
        }

        if affordances.controls {
            let channel_controls = |channel: Channel| -> Element<Message> {
                row![
                    text(format!("Channel {}", channel)).width(90),
                    text_input("0", self.strength_input(channel))
                        .width(60)
                        .on_input(move |value| Message::StrengthInput(channel, value))
                        .on_submit(Message::StrengthSubmit(channel)),
                    PickList::new(
                        &WAVE_CHOICES[..],
                        Some(WaveChoice(self.config.wave(channel))),
                        move |choice| Message::WaveSelected(channel, choice),
                    ).width(120),
                ]
                .align_items(Alignment::Center)
                .spacing(20)
                .into()
            };

            content = content.push(horizontal_rule(10));
            for channel in Channel::BOTH {
                content = content.push(channel_controls(channel));
            }
        }

        if affordances.disconnect {
            content = content.push(
                button(text("Disconnect"))
                    .style(theme::Button::Destructive)
                    .on_press(Message::Disconnect)
            );
        }

        container(content)
            .width(Length::Fill)
            .padding(20)
            .into()
    }
}

pub fn run_application() -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("dglab-link".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(500.0, 600.0);
    settings.window.resizable = false;

    // this function will call process::exit() unless there was a startup error
    MyApplication::run(settings)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application(name: &str) -> MyApplication {
        let path = std::env::temp_dir()
            .join(format!("dglab-link-test-{}-app-{}", std::process::id(), name))
            .join("dglab-link.json");
        let config_io = ConfigIO::open_sync(&path).unwrap();
        let (app, _) = MyApplication::new(ApplicationFlags { config_io });
        app
    }

    fn close_requested() -> Message {
        Message::EventOccurred(Event::Window(window::Id::MAIN, window::Event::CloseRequested))
    }

    #[test]
    fn close_waits_for_the_controller_to_stop() {
        let mut app = application("close-waits");
        let (handle, mut commands) = ControllerHandle::detached();
        let _ = app.update(Message::DeviceEvent(DeviceEvent::Ready(handle)));

        let _ = app.update(close_requested());
        assert!(matches!(commands.try_next(), Ok(Some(DeviceCommand::Shutdown))));
        assert!(!app.app_cancel.is_cancelled());
        assert_eq!(app.closing, Some(window::Id::MAIN));

        // closing again does not ask twice
        let _ = app.update(close_requested());
        assert!(commands.try_next().is_err());

        let _ = app.update(Message::DeviceEvent(DeviceEvent::Stopped));
        assert!(app.app_cancel.is_cancelled());
        assert_eq!(app.closing, None);

        // the timer firing afterwards changes nothing
        let _ = app.update(Message::ShutdownTimedOut);
        assert_eq!(app.closing, None);
    }

    #[test]
    fn close_without_controller_is_immediate() {
        let mut app = application("close-immediate");

        let _ = app.update(close_requested());
        assert!(app.app_cancel.is_cancelled());
        assert_eq!(app.closing, None);
    }

    #[test]
    fn close_gives_up_after_the_timeout() {
        let mut app = application("close-timeout");
        let (handle, _commands) = ControllerHandle::detached();
        let _ = app.update(Message::DeviceEvent(DeviceEvent::Ready(handle)));

        let _ = app.update(close_requested());
        assert!(!app.app_cancel.is_cancelled());

        let _ = app.update(Message::ShutdownTimedOut);
        assert!(app.app_cancel.is_cancelled());
        assert_eq!(app.closing, None);
    }

    #[test]
    fn close_with_a_stopped_controller_is_immediate() {
        let mut app = application("close-stopped");
        let (handle, commands) = ControllerHandle::detached();
        let _ = app.update(Message::DeviceEvent(DeviceEvent::Ready(handle)));
        drop(commands);

        let _ = app.update(close_requested());
        assert!(app.app_cancel.is_cancelled());
    }
}
