pub mod monitor;

pub use monitor::{MonitorState, RecoveryMonitor, RecoveryTarget, TickOutcome};
