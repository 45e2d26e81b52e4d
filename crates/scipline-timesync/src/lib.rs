//! Passive synchronization of a wrapping device clock to host time.
//!
//! Sensors stamp their data with a free-running tick counter that has no
//! epoch, drifts, and wraps. [`ClockSync`] watches `(host time, device tick)`
//! pairs as they arrive and converts later device ticks into host-comparable
//! microsecond timestamps, without ever probing the device.
//!
//! The estimate is causal and conservative: it only ever advances its anchor
//! when the new observation is consistent with the declared rate error, and
//! forces a resynchronization when the two clocks disagree by more than the
//! configured reset time.

pub mod config;
pub mod error;
pub mod sync;

pub use config::TimeSyncConfig;
pub use error::{Result, TimeSyncError};
pub use sync::{ClockSync, SyncOutcome, SyncStats};
