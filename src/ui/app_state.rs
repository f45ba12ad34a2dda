//! # Application State Management
//!
//! This module implements the central `AppState` struct which holds the HMI
//! state and coordinates the rendering of all panels. It implements the
//! `eframe::App` trait to integrate with the egui application framework.
//!
//! ## Responsibilities
//!
//! - Holds the control inputs (device address, colour sliders, selected mode)
//! - Processes status updates from the background tasks via `ui_refresh_rx`
//! - Takes the newest chart frame from the telemetry task's `ChartSignal`
//! - Sends dispatch requests and address changes via `ui_command_tx`
//! - Toggles the telemetry subscription through a shared flag
//! - Persists the device address and subscription toggle across sessions

use eframe::egui;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ConnectivityStatus, SubscriptionStatus, UICommand, UIRefreshState};
use crate::config::HmiConfig;
use crate::control::{DeviceAddress, DeviceCommand, LightMode};
use crate::telemetry::{ChartFrame, ChartSignal, NodeStatus};

/// Storage key of the persisted settings.
const SETTINGS_KEY: &str = "hmi_settings";

/// Repaint interval so background updates show up without user input.
const REPAINT_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

pub const WHITE: (u8, u8, u8) = (255, 255, 255);
pub const WARM: (u8, u8, u8) = (255, 120, 40);

/// Keyboard shortcuts of the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Apply,
    White,
    Warm,
    Off,
}

impl Shortcut {
    /// Map a key press to a shortcut. Auto-repeat and releases are ignored.
    pub fn from_event(event: &egui::Event) -> Option<Self> {
        match event {
            egui::Event::Key {
                key,
                pressed: true,
                repeat: false,
                ..
            } => match key {
                egui::Key::Enter => Some(Shortcut::Apply),
                egui::Key::W => Some(Shortcut::White),
                egui::Key::N => Some(Shortcut::Warm),
                egui::Key::O => Some(Shortcut::Off),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Central application state.
pub struct AppState {
    /// Receiver for status updates from the background tasks.
    pub ui_refresh_rx: crate::UIRefreshQueueReceiver,
    /// Sender for commands to the dispatcher task.
    pub ui_command_tx: crate::UICommandQueueSender,
    /// Newest chart frame published by the telemetry task.
    pub chart_signal: &'static ChartSignal,

    // Device
    /// Contents of the address text field.
    pub address_input: String,
    /// Last saved device address.
    pub device_address: DeviceAddress,

    // Colour controls
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub brightness: u8,
    /// Highlighted mode segment; follows the device once snapshots arrive.
    pub active_mode: Option<LightMode>,

    // Status
    pub connectivity: ConnectivityStatus,
    pub subscription: SubscriptionStatus,
    /// Last diagnostic line (`SEND: ...`, `SENT: ...`, `FAIL: ...`).
    pub diagnostic: String,
    /// Jobs waiting behind the one in flight.
    pub queue_depth: usize,
    /// Device state from the most recent snapshot.
    pub node_status: Option<NodeStatus>,
    /// Most recently published chart frame.
    pub chart: ChartFrame,

    // Telemetry subscription toggle, shared with the subscription thread
    pub telemetry_enabled: bool,
    telemetry_flag: Arc<AtomicBool>,
}

/// Settings persisted across application sessions.
#[derive(Default, Serialize, Deserialize)]
struct PersistedSettings {
    device_address: Option<String>,
    telemetry_enabled: Option<bool>,
}

impl AppState {
    /// Create a new AppState, loading persisted settings if available.
    ///
    /// The restored device address is sent to the dispatcher right away and the
    /// restored subscription toggle is written to `telemetry_flag`.
    ///
    /// # Parameters
    ///
    /// * `rx` - Receiver for UI refresh messages
    /// * `tx` - Sender for commands to the dispatcher task
    /// * `chart_signal` - Slot holding the newest chart frame
    /// * `telemetry_flag` - Pause/resume flag read by the subscription thread
    /// * `config` - Start-up configuration (default address, telemetry enabled)
    /// * `storage` - Optional persistent storage for loading saved settings
    pub fn new(
        rx: crate::UIRefreshQueueReceiver,
        tx: crate::UICommandQueueSender,
        chart_signal: &'static ChartSignal,
        telemetry_flag: Arc<AtomicBool>,
        config: &HmiConfig,
        storage: Option<&dyn eframe::Storage>,
    ) -> Self {
        let persisted: PersistedSettings = storage.and_then(|s| eframe::get_value(s, SETTINGS_KEY)).unwrap_or_default();
        Self::with_settings(rx, tx, chart_signal, telemetry_flag, config, persisted)
    }

    fn with_settings(
        rx: crate::UIRefreshQueueReceiver,
        tx: crate::UICommandQueueSender,
        chart_signal: &'static ChartSignal,
        telemetry_flag: Arc<AtomicBool>,
        config: &HmiConfig,
        persisted: PersistedSettings,
    ) -> Self {
        let default_address = DeviceAddress::normalize(&config.device.default_address);
        let device_address = persisted
            .device_address
            .map(|saved| DeviceAddress::normalize_or(&saved, &default_address))
            .unwrap_or(default_address);
        let telemetry_enabled = persisted.telemetry_enabled.unwrap_or(config.telemetry.enabled);
        telemetry_flag.store(telemetry_enabled, Ordering::Relaxed);

        let _ = tx.try_send(UICommand::SetDeviceAddress(device_address.clone()));

        Self {
            ui_refresh_rx: rx,
            ui_command_tx: tx,
            chart_signal,
            address_input: device_address.to_string(),
            device_address,
            red: WHITE.0,
            green: WHITE.1,
            blue: WHITE.2,
            brightness: 128,
            active_mode: None,
            connectivity: ConnectivityStatus::default(),
            subscription: if telemetry_enabled {
                SubscriptionStatus::Connecting
            } else {
                SubscriptionStatus::Off
            },
            diagnostic: "—".to_string(),
            queue_depth: 0,
            node_status: None,
            chart: ChartFrame::default(),
            telemetry_enabled,
            telemetry_flag,
        }
    }

    /// Queue a command on the dispatcher.
    pub fn dispatch(&mut self, command: DeviceCommand) {
        if let DeviceCommand::Mode(mode) = command {
            self.active_mode = Some(mode);
        }
        if self.ui_command_tx.try_send(UICommand::Dispatch(command)).is_err() {
            log::warn!("Command queue full, {} dropped", command.label());
            self.diagnostic = format!("FAIL: {}\ncommand queue full", command.label());
        }
    }

    /// Normalize and save the address field. An input that normalizes to
    /// nothing keeps the previous address.
    pub fn save_address(&mut self) {
        self.device_address = DeviceAddress::normalize_or(&self.address_input, &self.device_address);
        self.address_input = self.device_address.to_string();
        let _ = self.ui_command_tx.try_send(UICommand::SetDeviceAddress(self.device_address.clone()));
        self.connectivity = ConnectivityStatus::AddressSaved;
        self.diagnostic = format!("IP SAVED: {}", self.device_address);
        log::info!("Device address saved: {}", self.device_address);
    }

    /// Send the slider colour, then the slider brightness.
    pub fn apply_color(&mut self) {
        self.dispatch(DeviceCommand::Rgb {
            r: self.red,
            g: self.green,
            b: self.blue,
        });
        self.dispatch(DeviceCommand::Brightness(self.brightness));
    }

    /// Move the colour sliders without sending anything.
    pub fn set_color(&mut self, (r, g, b): (u8, u8, u8)) {
        self.red = r;
        self.green = g;
        self.blue = b;
    }

    pub fn color_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    pub fn set_telemetry_enabled(&mut self, enabled: bool) {
        self.telemetry_enabled = enabled;
        self.telemetry_flag.store(enabled, Ordering::Relaxed);
        if enabled {
            self.subscription = SubscriptionStatus::Connecting;
        } else {
            self.subscription = SubscriptionStatus::Off;
            self.node_status = None;
        }
    }

    pub fn run_shortcut(&mut self, shortcut: Shortcut) {
        match shortcut {
            Shortcut::Apply => self.apply_color(),
            Shortcut::White => self.set_color(WHITE),
            Shortcut::Warm => self.set_color(WARM),
            Shortcut::Off => self.dispatch(DeviceCommand::Power { on: false }),
        }
    }

    /// Apply one update from the background tasks.
    pub fn handle_refresh(&mut self, msg: UIRefreshState) {
        match msg {
            UIRefreshState::Connectivity(status) => {
                self.connectivity = status;
            }
            UIRefreshState::Diagnostic(line) => {
                self.diagnostic = line;
            }
            UIRefreshState::QueueDepth(depth) => {
                self.queue_depth = depth;
            }
            UIRefreshState::NodeStatus(status) => {
                // Snapshots still in flight when the toggle went off are dropped.
                if !self.telemetry_enabled {
                    return;
                }
                if status.active_mode.is_some() {
                    self.active_mode = status.active_mode;
                }
                self.node_status = Some(status);
            }
            UIRefreshState::Subscription(status) => {
                if let SubscriptionStatus::Failed(reason) = &status {
                    log::debug!("Subscription failure shown: {}", reason);
                }
                self.subscription = status;
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        // Typing into the address field must not trigger shortcuts.
        if ctx.wants_keyboard_input() {
            return;
        }
        let shortcuts: Vec<Shortcut> = ctx.input(|i| i.events.iter().filter_map(Shortcut::from_event).collect());
        for shortcut in shortcuts {
            self.run_shortcut(shortcut);
        }
    }
}

impl eframe::App for AppState {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let settings = PersistedSettings {
            device_address: Some(self.device_address.to_string()),
            telemetry_enabled: Some(self.telemetry_enabled),
        };
        eframe::set_value(storage, SETTINGS_KEY, &settings);
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Repaint periodically so background updates are visible without input
        ctx.request_repaint_after(REPAINT_INTERVAL);

        while let Ok(msg) = self.ui_refresh_rx.try_receive() {
            self.handle_refresh(msg);
        }
        if let Some(frame) = self.chart_signal.try_take() {
            self.chart = frame;
        }

        self.handle_shortcuts(ctx);

        // Panels layout: top (fixed), right (fixed), chart fills the remaining using CentralPanel
        super::top_panel::render(ctx, self);
        super::right_panel::render(ctx, self);
        super::chart::render(ctx, self);
    }
}
