//! # Central Telemetry Chart
//!
//! Draws the latest [`ChartFrame`] as two line series (lux and brightness)
//! sharing one value axis. Null points break a series into separate runs,
//! so a missing reading shows as a gap rather than a drop to zero.
//!
//! ## Coordinate Mapping
//!
//! Sample `i` of `n` maps linearly onto the plot width and values map onto
//! the plot height between the smallest and largest finite value of either
//! series. Only the first and last time labels are drawn.

use crate::telemetry::ChartFrame;
use crate::ui::AppState;
use eframe::egui;
use egui::{Color32, Pos2, Stroke};

const SERIES_A_COLOR: Color32 = Color32::from_rgb(255, 190, 60);
const SERIES_B_COLOR: Color32 = Color32::from_rgb(80, 170, 255);
const GRID_LINES: usize = 4;
const AXIS_MARGIN: f32 = 44.0;

/// Render the central chart panel.
pub fn render(ctx: &egui::Context, state: &mut AppState) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.heading("Live telemetry");
            ui.add_space(12.0);
            legend(ui, "Lux", SERIES_A_COLOR);
            legend(ui, "BRI", SERIES_B_COLOR);
            ui.label(egui::RichText::new(format!("{} points", state.chart.len())).weak());
        });
        ui.separator();

        if state.chart.is_empty() {
            ui.centered_and_justified(|ui| {
                ui.label("Waiting for telemetry…");
            });
            return;
        }
        draw_chart(ui, &state.chart);
    });
}

fn legend(ui: &mut egui::Ui, name: &str, color: Color32) {
    let (rect, _) = ui.allocate_exact_size(egui::vec2(14.0, 4.0), egui::Sense::hover());
    ui.painter().rect_filled(rect, 1.0, color);
    ui.label(name);
}

fn draw_chart(ui: &mut egui::Ui, frame: &ChartFrame) {
    let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::hover());
    let outer = response.rect;
    let plot = egui::Rect::from_min_max(
        egui::pos2(outer.left() + AXIS_MARGIN, outer.top() + 8.0),
        egui::pos2(outer.right() - 8.0, outer.bottom() - 22.0),
    );
    let text_color = ui.visuals().text_color();
    let grid_stroke = Stroke::new(1.0, ui.visuals().widgets.noninteractive.bg_stroke.color);
    let font = egui::FontId::proportional(11.0);

    let (min, max) = value_range(frame).unwrap_or((0.0, 1.0));

    // Horizontal grid with value labels
    for i in 0..=GRID_LINES {
        let t = i as f32 / GRID_LINES as f32;
        let y = egui::lerp(plot.bottom()..=plot.top(), t);
        painter.line_segment([egui::pos2(plot.left(), y), egui::pos2(plot.right(), y)], grid_stroke);
        let value = min + (max - min) * t as f64;
        painter.text(egui::pos2(plot.left() - 6.0, y), egui::Align2::RIGHT_CENTER, format_tick(value), font.clone(), text_color);
    }

    let to_screen = |index: usize, value: f64| -> Pos2 {
        let x = if frame.len() > 1 {
            egui::lerp(plot.left()..=plot.right(), index as f32 / (frame.len() - 1) as f32)
        } else {
            plot.center().x
        };
        let t = ((value - min) / (max - min)) as f32;
        egui::pos2(x, egui::lerp(plot.bottom()..=plot.top(), t))
    };

    for (series, color) in [(&frame.series_a, SERIES_A_COLOR), (&frame.series_b, SERIES_B_COLOR)] {
        for run in line_runs(series) {
            let points: Vec<Pos2> = run.iter().map(|&(i, v)| to_screen(i, v)).collect();
            if let [single] = points.as_slice() {
                painter.circle_filled(*single, 2.5, color);
            } else {
                painter.add(egui::Shape::line(points, Stroke::new(2.0, color)));
            }
        }
    }

    if let (Some(first), Some(last)) = (frame.labels.first(), frame.labels.last()) {
        let y = plot.bottom() + 4.0;
        painter.text(egui::pos2(plot.left(), y), egui::Align2::LEFT_TOP, first, font.clone(), text_color);
        if frame.len() > 1 {
            painter.text(egui::pos2(plot.right(), y), egui::Align2::RIGHT_TOP, last, font, text_color);
        }
    }
}

/// Smallest and largest finite value of either series, padded when flat.
pub fn value_range(frame: &ChartFrame) -> Option<(f64, f64)> {
    let mut values = frame.series_a.iter().chain(frame.series_b.iter()).flatten().copied().filter(|v| v.is_finite());
    let first = values.next()?;
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if max - min < f64::EPSILON {
        Some((min - 1.0, max + 1.0))
    } else {
        Some((min, max))
    }
}

/// Split a series into runs of consecutive present points, keeping indices.
pub fn line_runs(series: &[Option<f64>]) -> Vec<Vec<(usize, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (index, value) in series.iter().enumerate() {
        match value {
            Some(v) => current.push((index, *v)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 100.0 || value.fract().abs() < 1e-9 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_break_the_line() {
        let runs = line_runs(&[Some(1.0), Some(2.0), None, None, Some(5.0), None, Some(7.0), Some(8.0)]);
        assert_eq!(runs, vec![vec![(0, 1.0), (1, 2.0)], vec![(4, 5.0)], vec![(6, 7.0), (7, 8.0)]]);
        assert!(line_runs(&[None, None]).is_empty());
    }

    #[test]
    fn range_spans_both_series() {
        let frame = ChartFrame {
            labels: vec!["a".into(), "b".into()],
            series_a: vec![Some(10.0), None],
            series_b: vec![Some(-2.0), Some(80.0)],
            redraw: None,
        };
        assert_eq!(value_range(&frame), Some((-2.0, 80.0)));
    }

    #[test]
    fn flat_or_empty_range() {
        let flat = ChartFrame {
            labels: vec!["a".into()],
            series_a: vec![Some(5.0)],
            series_b: vec![None],
            redraw: None,
        };
        assert_eq!(value_range(&flat), Some((4.0, 6.0)));
        assert_eq!(value_range(&ChartFrame::default()), None);
    }
}
