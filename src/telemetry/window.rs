//! Bounded telemetry window with throttled publishing.
//!
//! Samples land in three parallel ring buffers (time labels, series A,
//! series B) of equal length. The chart is not redrawn per sample: the first
//! accepted sample after a publish arms a single publish `publish_interval`
//! later, and everything ingested until then rides along with it.

use std::collections::VecDeque;

/// Upper bound on the up-front allocation; larger windows grow on demand.
const PREALLOCATE_LIMIT: usize = 1024;

use crate::clock::{Clock, format_time_label};
use crate::config::TelemetryConfig;

use super::sample::TelemetrySample;

/// How the chart should redraw a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawMode {
    /// Replace the data without any transition animation.
    NoTransition,
}

/// Copy of the window handed to the chart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartFrame {
    pub labels: Vec<String>,
    pub series_a: Vec<Option<f64>>,
    pub series_b: Vec<Option<f64>>,
    pub redraw: Option<RedrawMode>,
}

impl ChartFrame {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Receiver of published frames.
pub trait RenderSink {
    fn publish(&mut self, frame: ChartFrame);
}

/// Three parallel FIFO buffers capped at `capacity` entries.
#[derive(Debug)]
pub struct TelemetryWindow {
    capacity: usize,
    labels: VecDeque<String>,
    series_a: VecDeque<Option<f64>>,
    series_b: VecDeque<Option<f64>>,
}

impl TelemetryWindow {
    pub fn new(capacity: usize) -> Self {
        let initial = capacity.min(PREALLOCATE_LIMIT);
        Self {
            capacity,
            labels: VecDeque::with_capacity(initial),
            series_a: VecDeque::with_capacity(initial),
            series_b: VecDeque::with_capacity(initial),
        }
    }

    pub fn push(&mut self, label: String, a: Option<f64>, b: Option<f64>) {
        self.labels.push_back(label);
        self.series_a.push_back(a);
        self.series_b.push_back(b);
        while self.labels.len() > self.capacity {
            self.labels.pop_front();
            self.series_a.pop_front();
            self.series_b.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn frame(&self) -> ChartFrame {
        ChartFrame {
            labels: self.labels.iter().cloned().collect(),
            series_a: self.series_a.iter().copied().collect(),
            series_b: self.series_b.iter().copied().collect(),
            redraw: Some(RedrawMode::NoTransition),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishState {
    Idle,
    Pending { due_ms: u64 },
}

/// Result of a single ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Appended,
    /// Same timestamp as the last accepted sample.
    Duplicate,
}

/// Deduplicating, throttled front-end of a [`TelemetryWindow`].
pub struct Windower<C: Clock> {
    clock: C,
    window: TelemetryWindow,
    last_timestamp: Option<i64>,
    publish_interval_ms: u64,
    state: PublishState,
}

impl<C: Clock> Windower<C> {
    pub fn new(clock: C, config: &TelemetryConfig) -> Self {
        Self {
            clock,
            window: TelemetryWindow::new(config.window_capacity),
            last_timestamp: None,
            publish_interval_ms: config.publish_interval_ms,
            state: PublishState::Idle,
        }
    }

    /// Append a sample unless it repeats the last accepted timestamp.
    ///
    /// Only exact repeats of the immediately preceding timestamp are dropped;
    /// out-of-order samples are appended as they come.
    pub fn ingest(&mut self, sample: TelemetrySample) -> IngestOutcome {
        if sample.timestamp.is_some() && sample.timestamp == self.last_timestamp {
            return IngestOutcome::Duplicate;
        }
        let timestamp = sample.timestamp.unwrap_or_else(|| self.clock.epoch_ms());
        self.last_timestamp = Some(timestamp);

        self.window.push(format_time_label(timestamp), finite(sample.value_a), finite(sample.value_b));

        if self.state == PublishState::Idle {
            self.state = PublishState::Pending {
                due_ms: self.clock.now_ms() + self.publish_interval_ms,
            };
        }
        IngestOutcome::Appended
    }

    /// Publish to `sink` if the pending publish is due. Returns whether it did.
    pub fn on_tick(&mut self, sink: &mut impl RenderSink) -> bool {
        match self.state {
            PublishState::Pending { due_ms } if self.clock.now_ms() >= due_ms => {
                self.state = PublishState::Idle;
                sink.publish(self.window.frame());
                true
            }
            _ => false,
        }
    }

    /// When the pending publish is due, if one is armed.
    pub fn next_publish_at(&self) -> Option<u64> {
        match self.state {
            PublishState::Pending { due_ms } => Some(due_ms),
            PublishState::Idle => None,
        }
    }

    pub fn window(&self) -> &TelemetryWindow {
        &self.window
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<ChartFrame>,
    }

    impl RenderSink for RecordingSink {
        fn publish(&mut self, frame: ChartFrame) {
            self.frames.push(frame);
        }
    }

    fn windower() -> (Windower<ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        (Windower::new(clock.clone(), &TelemetryConfig::default()), clock)
    }

    fn sample(ts: i64, a: f64, b: f64) -> TelemetrySample {
        TelemetrySample {
            timestamp: Some(ts),
            value_a: Some(a),
            value_b: Some(b),
        }
    }

    #[test]
    fn repeated_timestamp_is_dropped() {
        let (mut windower, clock) = windower();
        assert_eq!(windower.ingest(sample(1000, 50.0, 80.0)), IngestOutcome::Appended);
        assert_eq!(windower.ingest(sample(1000, 999.0, 999.0)), IngestOutcome::Duplicate);

        clock.advance(250);
        let mut sink = RecordingSink::default();
        assert!(windower.on_tick(&mut sink));
        let frame = &sink.frames[0];
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.labels[0], format_time_label(1000));
        assert_eq!(frame.series_a, vec![Some(50.0)]);
        assert_eq!(frame.series_b, vec![Some(80.0)]);
    }

    #[test]
    fn only_the_immediately_preceding_timestamp_dedups() {
        let (mut windower, _clock) = windower();
        windower.ingest(sample(1000, 1.0, 1.0));
        windower.ingest(sample(2000, 2.0, 2.0));
        assert_eq!(windower.ingest(sample(1000, 3.0, 3.0)), IngestOutcome::Appended);
        assert_eq!(windower.window().len(), 3);
    }

    #[test]
    fn window_is_capped_and_evicts_oldest_first() {
        let (mut windower, clock) = windower();
        for i in 0..305 {
            windower.ingest(sample(1_000 + i * 1_000, i as f64, (i * 2) as f64));
        }
        assert_eq!(windower.window().len(), 300);

        clock.advance(250);
        let mut sink = RecordingSink::default();
        windower.on_tick(&mut sink);
        let frame = &sink.frames[0];
        assert_eq!(frame.len(), 300);
        assert_eq!(frame.series_a.len(), 300);
        assert_eq!(frame.series_b.len(), 300);
        // First entry is the 6th sample ingested.
        assert_eq!(frame.series_a[0], Some(5.0));
        assert_eq!(frame.series_b[0], Some(10.0));
        assert_eq!(frame.labels[0], format_time_label(6_000));
        assert_eq!(frame.series_a[299], Some(304.0));
    }

    #[test]
    fn huge_capacity_does_not_preallocate() {
        let mut window = TelemetryWindow::new(usize::MAX);
        window.push("00:00:00".to_string(), Some(1.0), None);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn short_streams_are_kept_whole() {
        let (mut windower, _clock) = windower();
        for i in 0..42 {
            windower.ingest(sample(1_000 + i, 0.0, 0.0));
        }
        assert_eq!(windower.window().len(), 42);
    }

    #[test]
    fn burst_within_interval_publishes_once_with_everything() {
        let (mut windower, clock) = windower();
        let mut sink = RecordingSink::default();

        windower.ingest(sample(1_000, 1.0, 1.0));
        assert_eq!(windower.next_publish_at(), Some(250));
        clock.set(100);
        windower.ingest(sample(1_100, 2.0, 2.0));
        clock.set(249);
        windower.ingest(sample(1_249, 3.0, 3.0));
        assert_eq!(windower.next_publish_at(), Some(250));
        assert!(!windower.on_tick(&mut sink));

        clock.set(250);
        assert!(windower.on_tick(&mut sink));
        assert!(!windower.on_tick(&mut sink));
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].series_a, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(sink.frames[0].redraw, Some(RedrawMode::NoTransition));
        assert_eq!(windower.next_publish_at(), None);
    }

    #[test]
    fn next_ingest_after_publish_arms_a_new_window() {
        let (mut windower, clock) = windower();
        let mut sink = RecordingSink::default();
        windower.ingest(sample(1_000, 1.0, 1.0));
        clock.set(250);
        windower.on_tick(&mut sink);

        clock.set(300);
        windower.ingest(sample(2_000, 2.0, 2.0));
        assert_eq!(windower.next_publish_at(), Some(550));
        clock.set(550);
        windower.on_tick(&mut sink);
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[1].len(), 2);
    }

    #[test]
    fn duplicate_does_not_arm_a_publish() {
        let (mut windower, clock) = windower();
        let mut sink = RecordingSink::default();
        windower.ingest(sample(1_000, 1.0, 1.0));
        clock.set(250);
        windower.on_tick(&mut sink);

        windower.ingest(sample(1_000, 1.0, 1.0));
        assert_eq!(windower.next_publish_at(), None);
    }

    #[test]
    fn missing_timestamp_uses_arrival_time_and_never_dedups() {
        let (mut windower, clock) = windower();
        let untimed = TelemetrySample {
            timestamp: None,
            value_a: None,
            value_b: Some(f64::NAN),
        };
        assert_eq!(windower.ingest(untimed), IngestOutcome::Appended);
        assert_eq!(windower.ingest(untimed), IngestOutcome::Appended);

        clock.set(250);
        let mut sink = RecordingSink::default();
        windower.on_tick(&mut sink);
        let frame = &sink.frames[0];
        assert_eq!(frame.labels[0], format_time_label(1_700_000_000_000));
        assert_eq!(frame.series_a, vec![None, None]);
        assert_eq!(frame.series_b, vec![None, None]);
    }

    #[test]
    fn published_frame_is_a_copy() {
        let (mut windower, clock) = windower();
        let mut sink = RecordingSink::default();
        windower.ingest(sample(1_000, 1.0, 1.0));
        clock.set(250);
        windower.on_tick(&mut sink);

        sink.frames[0].series_a.clear();
        assert_eq!(windower.window().frame().series_a, vec![Some(1.0)]);
    }
}
