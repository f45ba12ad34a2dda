// UI module for the ESP light controller HMI
//
// This module organizes the UI into separate components:
// - `top_panel`: Device address and lighting controls
// - `right_panel`: Connection pills, diagnostics and node status table
// - `chart`: Central telemetry chart
// - `app_state`: Application state management and main update loop

pub mod app_state;
pub mod chart;
pub mod right_panel;
pub mod top_panel;

use crate::control::{DeviceAddress, DeviceCommand};
use crate::telemetry::NodeStatus;

pub use app_state::AppState;

/// Outcome of the most recent device exchange, shown as the connection pill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityStatus {
    #[default]
    Idle,
    Sending,
    Sent,
    Offline,
    AddressSaved,
}

impl ConnectivityStatus {
    pub fn pill_text(&self) -> &'static str {
        match self {
            ConnectivityStatus::Idle => "ESP: —",
            ConnectivityStatus::Sending => "SENDING…",
            ConnectivityStatus::Sent => "SENT",
            ConnectivityStatus::Offline => "ESP OFFLINE",
            ConnectivityStatus::AddressSaved => "IP saved",
        }
    }
}

/// State of the realtime-database subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionStatus {
    #[default]
    Connecting,
    Ok,
    Off,
    Failed(String),
}

impl SubscriptionStatus {
    pub fn pill_text(&self) -> &'static str {
        match self {
            SubscriptionStatus::Connecting => "FB: …",
            SubscriptionStatus::Ok => "FB: OK",
            SubscriptionStatus::Off => "FB: OFF",
            SubscriptionStatus::Failed(_) => "FB: FAIL",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum UIRefreshState {
    Connectivity(ConnectivityStatus),
    Diagnostic(String),
    QueueDepth(usize),
    NodeStatus(NodeStatus),
    Subscription(SubscriptionStatus),
}

#[derive(Debug)]
pub enum UICommand {
    Dispatch(DeviceCommand),
    SetDeviceAddress(DeviceAddress),
}
