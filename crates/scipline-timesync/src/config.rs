use serde::{Deserialize, Serialize};

use crate::error::{Result, TimeSyncError};

/// Parameters describing a device clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSyncConfig {
    /// Nominal device tick rate.
    pub ticks_per_second: f64,
    /// Exclusive upper bound of the raw counter. `None` means it never wraps.
    pub tick_wrap: Option<i64>,
    /// Largest fractional rate error to tolerate, e.g. `0.001` for 0.1%.
    pub rate_error: f64,
    /// Seconds of disagreement between the clocks that force a resync.
    pub reset_time: f64,
}

impl TimeSyncConfig {
    /// Millisecond counter with a 24-bit wrap, as found on Hokuyo URG/UTM
    /// scanners.
    pub fn hokuyo() -> Self {
        Self {
            ticks_per_second: 1000.0,
            tick_wrap: Some(1 << 24),
            rate_error: 0.001,
            reset_time: 0.5,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.ticks_per_second.is_finite() && self.ticks_per_second > 0.0) {
            return Err(TimeSyncError::InvalidConfig(format!(
                "ticks_per_second must be positive, got {}",
                self.ticks_per_second
            )));
        }
        if let Some(wrap) = self.tick_wrap {
            if wrap <= 0 {
                return Err(TimeSyncError::InvalidConfig(format!(
                    "tick_wrap must be positive, got {wrap}"
                )));
            }
        }
        if !self.rate_error.is_finite() || !self.reset_time.is_finite() {
            return Err(TimeSyncError::InvalidConfig(
                "rate_error and reset_time must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self::hokuyo()
    }
}
