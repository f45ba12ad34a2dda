//! ESP light controller HMI.
//!
//! Desktop control panel for an ESP32 lighting node: queued side-channel HTTP
//! commands to the device, and a live chart of the node state streamed from
//! the realtime database.
//!
//! Threads:
//! - main: egui/eframe UI
//! - `embassy-executor`: dispatcher and telemetry tasks
//! - `command-loader`: blocking HTTP loads for the dispatcher
//! - `telemetry-subscription`: blocking realtime-database stream reader

use eframe::egui;
use embassy_executor::{Executor, Spawner};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use env_logger::Builder;
use log::{LevelFilter, error, info};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;

mod clock;
mod config;
mod control;
mod telemetry;
mod ui;

use config::HmiConfig;
use telemetry::{ChartSignal, SnapshotQueue};
use telemetry::subscription::SnapshotQueueReceiver;
use ui::{AppState, UICommand, UIRefreshState};

const UI_REFRESH_QUEUE_SIZE: usize = 100;
type UIRefreshQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, UIRefreshState, UI_REFRESH_QUEUE_SIZE>;
type UIRefreshQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, UIRefreshState, UI_REFRESH_QUEUE_SIZE>;
type UIRefreshQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, UIRefreshState, UI_REFRESH_QUEUE_SIZE>;

const UI_COMMAND_QUEUE_SIZE: usize = 100;
type UICommandQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, UICommand, UI_COMMAND_QUEUE_SIZE>;
type UICommandQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, UICommand, UI_COMMAND_QUEUE_SIZE>;
type UICommandQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, UICommand, UI_COMMAND_QUEUE_SIZE>;

fn embassy_init(
    spawner: Spawner,
    config: HmiConfig,
    ui_refresh_tx: UIRefreshQueueSender,
    ui_command_rx: UICommandQueueReceiver,
    snapshot_rx: SnapshotQueueReceiver,
    chart_signal: &'static ChartSignal,
) {
    if let Err(e) = spawner.spawn(control::dispatcher_task(config.device, config.dispatch, ui_refresh_tx, ui_command_rx)) {
        error!("Failed to spawn dispatcher task: {:?}", e);
    }
    if let Err(e) = spawner.spawn(telemetry::telemetry_task(config.telemetry, snapshot_rx, chart_signal, ui_refresh_tx)) {
        error!("Failed to spawn telemetry task: {:?}", e);
    }
}

fn main() {
    // Logging setup; RUST_LOG overrides the defaults
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("esp_light_hmi"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Starting up");

    let config_path = HmiConfig::path_from_args(std::env::args());
    let config = match HmiConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    let ui_refresh_queue: &'static UIRefreshQueue = Box::leak(Box::new(UIRefreshQueue::new()));
    let ui_command_queue: &'static UICommandQueue = Box::leak(Box::new(UICommandQueue::new()));
    let snapshot_queue: &'static SnapshotQueue = Box::leak(Box::new(SnapshotQueue::new()));
    let chart_signal: &'static ChartSignal = Box::leak(Box::new(ChartSignal::new()));

    let ui_refresh_tx = ui_refresh_queue.sender();
    let ui_refresh_rx = ui_refresh_queue.receiver();
    let ui_command_tx = ui_command_queue.sender();
    let ui_command_rx = ui_command_queue.receiver();

    // The UI restores the persisted toggle into this flag before the first frame
    let telemetry_flag = Arc::new(AtomicBool::new(config.telemetry.enabled));
    if let Err(e) = telemetry::spawn_subscription(config.telemetry.clone(), telemetry_flag.clone(), snapshot_queue.sender(), ui_refresh_tx) {
        error!("Failed to start telemetry subscription: {}", e);
    }

    // Spawn Embassy executor on a dedicated background thread
    let task_config = config.clone();
    let snapshot_rx = snapshot_queue.receiver();
    let embassy_thread = thread::Builder::new().name("embassy-executor".to_string()).spawn(move || {
        // Leak the executor to satisfy the 'static lifetime required by run()
        let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
        executor.run(|spawner| embassy_init(spawner, task_config, ui_refresh_tx, ui_command_rx, snapshot_rx, chart_signal));
    });
    if let Err(e) = embassy_thread {
        error!("Failed to spawn embassy thread: {}", e);
        std::process::exit(1);
    }

    // Start the GUI on the main thread (required on macOS)
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 760.0]).with_title("ESP Light HMI"),
        ..Default::default()
    };
    if let Err(e) = eframe::run_native(
        "ESP Light HMI",
        native_options,
        Box::new(move |cc| Ok(Box::new(AppState::new(ui_refresh_rx, ui_command_tx, chart_signal, telemetry_flag, &config, cc.storage)))),
    ) {
        error!("UI exited with error: {}", e);
    }
}
