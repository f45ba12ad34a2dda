//! Time sources shared by the dispatcher and the telemetry windower.
//!
//! Deadlines and throttling run on the monotonic embassy clock, while cache
//! busting and default sample timestamps need wall-clock epoch milliseconds.
//! Both are behind [`Clock`] so the pipelines can be driven deterministically
//! in tests.

use chrono::{Local, TimeZone};

/// Source of monotonic and wall-clock time, in milliseconds.
pub trait Clock {
    /// Monotonic milliseconds; only differences are meaningful.
    fn now_ms(&self) -> u64;
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> i64;
}

/// Clock backed by the embassy time driver and the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }

    fn epoch_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Format an epoch timestamp as a local `HH:MM:SS` label.
pub fn format_time_label(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

#[cfg(test)]
pub use manual::ManualClock;
