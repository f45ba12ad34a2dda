//! Telemetry task: folds incoming snapshots into the chart window and
//! publishes throttled chart frames to the UI.
//!
//! Frames go through a [`ChartSignal`] rather than the UI refresh queue. The
//! signal holds only the newest frame, so a busy or minimised UI skips stale
//! frames instead of losing the latest one.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};

use crate::UIRefreshQueueSender;
use crate::clock::SystemClock;
use crate::config::TelemetryConfig;
use crate::ui::UIRefreshState;

use super::subscription::SnapshotQueueReceiver;
use super::window::{ChartFrame, IngestOutcome, RenderSink, Windower};

/// Latest published chart frame, taken by the UI when it draws.
pub type ChartSignal = Signal<CriticalSectionRawMutex, ChartFrame>;

/// Render sink that replaces the frame held in a [`ChartSignal`].
pub struct ChartSink {
    signal: &'static ChartSignal,
}

impl ChartSink {
    pub fn new(signal: &'static ChartSignal) -> Self {
        Self { signal }
    }
}

impl RenderSink for ChartSink {
    fn publish(&mut self, frame: ChartFrame) {
        self.signal.signal(frame);
    }
}

/// Telemetry task.
///
/// # Parameters
///
/// * `config` - Window capacity and publish interval
/// * `snapshot_rx` - Snapshots from the subscription thread
/// * `chart_signal` - Slot receiving every published chart frame
/// * `ui_refresh_tx` - Channel for node status updates
#[embassy_executor::task]
pub async fn telemetry_task(
    config: TelemetryConfig,
    snapshot_rx: SnapshotQueueReceiver,
    chart_signal: &'static ChartSignal,
    ui_refresh_tx: UIRefreshQueueSender,
) {
    let mut windower = Windower::new(SystemClock, &config);
    let mut sink = ChartSink::new(chart_signal);

    log::info!(
        "Telemetry task started (window {}, publish every {} ms)",
        config.window_capacity,
        config.publish_interval_ms
    );

    loop {
        let snapshot = match windower.next_publish_at() {
            Some(due) => match select(snapshot_rx.receive(), Timer::at(Instant::from_millis(due))).await {
                Either::First(snapshot) => Some(snapshot),
                Either::Second(()) => None,
            },
            None => Some(snapshot_rx.receive().await),
        };

        if let Some(snapshot) = snapshot {
            let _ = ui_refresh_tx.try_send(UIRefreshState::NodeStatus(snapshot.status()));
            if windower.ingest(snapshot.sample()) == IngestOutcome::Duplicate {
                log::trace!("Duplicate telemetry timestamp skipped");
            }
        }

        windower.on_tick(&mut sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UIRefreshQueue;
    use crate::clock::ManualClock;
    use crate::telemetry::sample::TelemetrySample;
    use crate::ui::ConnectivityStatus;

    fn sample(ts: i64, a: f64) -> TelemetrySample {
        TelemetrySample {
            timestamp: Some(ts),
            value_a: Some(a),
            value_b: None,
        }
    }

    #[test]
    fn frame_is_delivered_while_ui_queue_is_full() {
        let ui_queue: &'static UIRefreshQueue = Box::leak(Box::new(UIRefreshQueue::new()));
        while ui_queue.try_send(UIRefreshState::Connectivity(ConnectivityStatus::Sent)).is_ok() {}

        let signal: &'static ChartSignal = Box::leak(Box::new(ChartSignal::new()));
        let clock = ManualClock::new(1_700_000_000_000);
        let mut windower = Windower::new(clock.clone(), &TelemetryConfig::default());
        let mut sink = ChartSink::new(signal);

        windower.ingest(sample(1_000, 42.0));
        clock.set(250);
        assert!(windower.on_tick(&mut sink));

        let frame = signal.try_take().expect("published frame");
        assert_eq!(frame.series_a, vec![Some(42.0)]);
    }

    #[test]
    fn untaken_frames_are_replaced_by_the_newest() {
        let signal: &'static ChartSignal = Box::leak(Box::new(ChartSignal::new()));
        let clock = ManualClock::new(1_700_000_000_000);
        let mut windower = Windower::new(clock.clone(), &TelemetryConfig::default());
        let mut sink = ChartSink::new(signal);

        windower.ingest(sample(1_000, 1.0));
        clock.set(250);
        windower.on_tick(&mut sink);
        windower.ingest(sample(2_000, 2.0));
        clock.set(500);
        windower.on_tick(&mut sink);

        let frame = signal.try_take().expect("published frame");
        assert_eq!(frame.series_a, vec![Some(1.0), Some(2.0)]);
        assert!(signal.try_take().is_none());
    }
}
