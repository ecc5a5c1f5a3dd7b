//! Bounded parallel execution and resource monitoring.

pub mod monitor;
pub mod parallel;

pub use monitor::{MonitorCallback, ResourceMonitor};
pub use parallel::{BoxedTask, ParallelExecutor};
