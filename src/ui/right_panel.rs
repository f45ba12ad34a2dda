//! # Right Panel - Connection and Device Status
//!
//! This module renders the fixed-width right panel displaying:
//! - Status pills for the device connection, the subscription and the device state
//! - The last diagnostic line and the number of queued commands
//! - The device state table built from the most recent snapshot
//! - The live telemetry toggle
//!
//! ## Status Table
//!
//! The table uses `egui_extras::TableBuilder`. Absent fields show as `—`,
//! with WiFi RSSI falling back to the LoRa RSSI when the bridge does not
//! report it separately.

use crate::telemetry::NodeStatus;
use crate::ui::{AppState, ConnectivityStatus, SubscriptionStatus};
use eframe::egui;
use egui::Color32;

const PLACEHOLDER: &str = "—";

/// Render the right status panel.
///
/// # Parameters
///
/// * `ctx` - egui context
/// * `state` - Mutable application state (the toggle writes back)
pub fn render(ctx: &egui::Context, state: &mut AppState) {
    egui::SidePanel::right("status_right").exact_width(340.0).show(ctx, |ui| {
        ui.heading("Status");
        ui.separator();

        ui.horizontal_wrapped(|ui| {
            let connection_ok = !matches!(state.connectivity, ConnectivityStatus::Offline | ConnectivityStatus::Idle);
            pill(ui, state.connectivity.pill_text(), connection_ok);
            pill(ui, state.subscription.pill_text(), state.subscription == SubscriptionStatus::Ok);
            match &state.node_status {
                Some(_) => pill(ui, "STATE: OK", true),
                None => pill(ui, "STATE: —", false),
            }
        });
        if let SubscriptionStatus::Failed(reason) = &state.subscription {
            ui.label(egui::RichText::new(reason).small().color(Color32::LIGHT_RED));
        }

        ui.add_space(6.0);
        let mut enabled = state.telemetry_enabled;
        if ui.checkbox(&mut enabled, "Live telemetry").changed() {
            state.set_telemetry_enabled(enabled);
        }

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Queued commands:");
            ui.label(egui::RichText::new(state.queue_depth.to_string()).strong());
        });
        ui.label("Last command:");
        egui::Frame::new().inner_margin(egui::Margin::same(6)).show(ui, |ui| {
            ui.label(egui::RichText::new(&state.diagnostic).monospace());
        });

        ui.separator();
        ui.strong("Device state");
        render_status_table(ui, state.node_status.as_ref());
    });
}

/// Rounded status label; dimmed when not `ok`.
fn pill(ui: &mut egui::Ui, text: &str, ok: bool) {
    let (fill, text_color) = if ok {
        (Color32::from_rgb(30, 90, 50), Color32::WHITE)
    } else {
        (Color32::from_rgb(70, 70, 70), Color32::from_gray(190))
    };
    egui::Frame::new()
        .fill(fill)
        .corner_radius(10.0)
        .inner_margin(egui::Margin::symmetric(8, 2))
        .show(ui, |ui| {
            ui.label(egui::RichText::new(text).color(text_color).strong());
        });
}

/// Field/value rows of the status table.
pub fn status_rows(status: Option<&NodeStatus>) -> [(&'static str, String); 7] {
    let text = |value: Option<&String>| value.cloned().unwrap_or_else(|| PLACEHOLDER.to_string());
    match status {
        Some(s) => [
            ("Lux", text(s.lux.as_ref())),
            ("WiFi RSSI", text(s.wifi_rssi.as_ref())),
            ("LoRa RSSI", text(s.lora_rssi.as_ref())),
            ("Mode", text(s.mode.as_ref())),
            ("Power", if s.power { "ON" } else { "OFF" }.to_string()),
            ("Preset", text(s.preset.as_ref())),
            ("Timestamp", text(s.timestamp.as_ref())),
        ],
        None => [
            ("Lux", PLACEHOLDER.to_string()),
            ("WiFi RSSI", PLACEHOLDER.to_string()),
            ("LoRa RSSI", PLACEHOLDER.to_string()),
            ("Mode", PLACEHOLDER.to_string()),
            ("Power", PLACEHOLDER.to_string()),
            ("Preset", PLACEHOLDER.to_string()),
            ("Timestamp", PLACEHOLDER.to_string()),
        ],
    }
}

fn render_status_table(ui: &mut egui::Ui, status: Option<&NodeStatus>) {
    use egui_extras::{Column, TableBuilder};

    let rows = status_rows(status);
    let row_height = ui.text_style_height(&egui::TextStyle::Body) * 1.3;
    TableBuilder::new(ui)
        .striped(true)
        .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
        .column(Column::initial(110.0).at_least(80.0)) // Field
        .column(Column::remainder()) // Value
        .header(row_height, |mut header| {
            header.col(|ui| {
                ui.strong("Field");
            });
            header.col(|ui| {
                ui.strong("Value");
            });
        })
        .body(|body| {
            body.rows(row_height, rows.len(), |mut row| {
                let (field, value) = &rows[row.index()];
                row.col(|ui| {
                    ui.label(*field);
                });
                row.col(|ui| {
                    ui.label(egui::RichText::new(value).monospace());
                });
            });
        });
}
