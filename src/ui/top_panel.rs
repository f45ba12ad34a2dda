//! # Top Panel - Device Controls
//!
//! This module renders the fixed-height top panel with three columns:
//! - Column 1: Device address, ping and power
//! - Column 2: Light mode segment and presets
//! - Column 3: Colour and brightness sliders with a preview swatch
//!
//! Every button only enqueues a command; outcomes show up in the right panel
//! once the dispatcher resolves them.

use crate::control::{DeviceCommand, LightMode, Preset};
use crate::ui::AppState;
use crate::ui::app_state::{WARM, WHITE};
use eframe::egui;
use egui::Color32;

/// Render the top control panel.
///
/// # Parameters
///
/// * `ctx` - egui context
/// * `state` - Mutable application state for reading and updating controls
pub fn render(ctx: &egui::Context, state: &mut AppState) {
    egui::TopBottomPanel::top("top_controls").exact_height(190.0).show(ctx, |ui| {
        ui.columns(3, |cols| {
            cols[0].vertical(|ui| {
                render_device(ui, state);
            });
            cols[1].vertical(|ui| {
                render_modes(ui, state);
            });
            cols[2].vertical(|ui| {
                render_color(ui, state);
            });
        });
    });
}

fn render_device(ui: &mut egui::Ui, state: &mut AppState) {
    ui.heading("Device");
    ui.separator();
    ui.horizontal(|ui| {
        ui.label("ESP address:");
        let response = ui.add(egui::TextEdit::singleline(&mut state.address_input).desired_width(140.0));
        let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        if ui.button("Save").clicked() || submitted {
            state.save_address();
        }
    });
    ui.horizontal(|ui| {
        ui.label("Target:");
        ui.label(egui::RichText::new(state.device_address.as_str()).monospace().strong());
    });
    ui.add_space(6.0);
    ui.horizontal(|ui| {
        if ui.button("Ping").clicked() {
            state.dispatch(DeviceCommand::Health);
        }
        if ui.button("Power On").clicked() {
            state.dispatch(DeviceCommand::Power { on: true });
        }
        if ui.button("Power Off").clicked() {
            state.dispatch(DeviceCommand::Power { on: false });
        }
    });
}

fn render_modes(ui: &mut egui::Ui, state: &mut AppState) {
    ui.heading("Mode");
    ui.separator();
    ui.horizontal(|ui| {
        for mode in LightMode::ALL {
            let selected = state.active_mode == Some(mode);
            if ui.selectable_label(selected, mode.to_string()).clicked() {
                state.dispatch(DeviceCommand::Mode(mode));
            }
        }
    });
    ui.add_space(6.0);
    ui.label("Preset");
    ui.horizontal(|ui| {
        for preset in Preset::ALL {
            if ui.button(preset.to_string()).clicked() {
                state.dispatch(DeviceCommand::Preset(preset));
            }
        }
    });
}

fn render_color(ui: &mut egui::Ui, state: &mut AppState) {
    ui.heading("Colour");
    ui.separator();
    ui.add(egui::Slider::new(&mut state.red, 0..=255).text("R"));
    ui.add(egui::Slider::new(&mut state.green, 0..=255).text("G"));
    ui.add(egui::Slider::new(&mut state.blue, 0..=255).text("B"));
    ui.add(egui::Slider::new(&mut state.brightness, 0..=255).text("BRI"));

    ui.horizontal(|ui| {
        let (rect, _) = ui.allocate_exact_size(egui::vec2(36.0, 18.0), egui::Sense::hover());
        ui.painter().rect_filled(rect, 3.0, Color32::from_rgb(state.red, state.green, state.blue));
        ui.label(egui::RichText::new(state.color_hex()).monospace());

        if ui.button("Apply").on_hover_text("Enter").clicked() {
            state.apply_color();
        }
        if ui.button("White").on_hover_text("W").clicked() {
            state.set_color(WHITE);
        }
        if ui.button("Warm").on_hover_text("N").clicked() {
            state.set_color(WARM);
        }
        if ui.button("Off").on_hover_text("O").clicked() {
            state.dispatch(DeviceCommand::Power { on: false });
        }
    });
}
