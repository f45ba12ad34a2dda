//! Command dispatch to the lighting controller.
//!
//! User actions become [`DeviceCommand`]s, which the dispatcher task queues
//! and sends one at a time over the side-channel HTTP transport. Outcomes are
//! inferred from load completion and a timeout, never from the response.

pub mod address;
pub mod command;
pub mod queue;
pub mod task;
pub mod transport;

pub use address::DeviceAddress;
pub use command::{DeviceCommand, LightMode, Preset};
pub use task::dispatcher_task;
