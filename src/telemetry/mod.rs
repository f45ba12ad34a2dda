//! Live telemetry: realtime-database subscription, sample coercion and the
//! bounded, throttled chart window.

pub mod sample;
pub mod subscription;
pub mod task;
pub mod window;

pub use sample::NodeStatus;
pub use subscription::{SnapshotQueue, spawn_subscription};
pub use task::{ChartSignal, telemetry_task};
pub use window::ChartFrame;
