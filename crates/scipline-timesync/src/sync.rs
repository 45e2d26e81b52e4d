use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TimeSyncConfig;
use crate::error::{Result, TimeSyncError};

const MICROS_PER_SECOND: f64 = 1.0e6;

/// Result of feeding one observation to [`ClockSync::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The observation was consistent with the current estimate.
    Synced,
    /// The clocks disagreed by at least `reset_time` (or this was the first
    /// observation); the estimate was re-anchored from scratch.
    ForcedResync,
}

/// Diagnostic snapshot of a [`ClockSync`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncStats {
    pub synced: bool,
    pub resync_count: u32,
    pub last_sync_error: f64,
    pub last_raw_ticks: i64,
    pub device_ticks_offset: i64,
}

/// A matched pair of unwrapped device ticks and host microseconds.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    device_ticks: i64,
    host_utime: i64,
}

/// Passive device-to-host clock estimator.
///
/// Sequential state: wrap it in a mutex if several threads feed or query it.
#[derive(Debug, Clone)]
pub struct ClockSync {
    config: TimeSyncConfig,
    anchor: Option<Anchor>,
    device_ticks_offset: i64,
    last_raw_ticks: i64,
    resync_count: u32,
    last_sync_error: f64,
}

impl ClockSync {
    /// Create an estimator for a clock with the given characteristics.
    pub fn new(
        ticks_per_second: f64,
        tick_wrap: Option<i64>,
        rate_error: f64,
        reset_time: f64,
    ) -> Result<Self> {
        Self::with_config(TimeSyncConfig {
            ticks_per_second,
            tick_wrap,
            rate_error,
            reset_time,
        })
    }

    pub fn with_config(config: TimeSyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            anchor: None,
            device_ticks_offset: 0,
            last_raw_ticks: 0,
            resync_count: 0,
            last_sync_error: 0.0,
        })
    }

    /// Feed one observation: the device reported `raw_device_ticks` at host
    /// time `host_utime` (microseconds).
    ///
    /// Must be called for a tick before [`get_host_utime`](Self::get_host_utime)
    /// is asked about it.
    pub fn update(&mut self, host_utime: i64, raw_device_ticks: i64) -> Result<SyncOutcome> {
        self.check_raw(raw_device_ticks)?;

        if raw_device_ticks < self.last_raw_ticks {
            if let Some(wrap) = self.config.tick_wrap {
                self.device_ticks_offset += wrap;
            }
        }
        self.last_raw_ticks = raw_device_ticks;
        let device_ticks = self.device_ticks_offset + raw_device_ticks;

        // Compare elapsed time on each clock rather than absolute values, so
        // only per-clock differences need to be representable in f64.
        let Some(anchor) = self.anchor else {
            self.last_sync_error = 0.0;
            self.resync(device_ticks, host_utime);
            debug!(device_ticks, host_utime, "initial clock anchor");
            return Ok(SyncOutcome::ForcedResync);
        };

        let dp = (device_ticks - anchor.device_ticks) as f64 / self.config.ticks_per_second;
        let dq = (host_utime - anchor.host_utime) as f64 / MICROS_PER_SECOND;
        let sync_error = (dp - dq).abs();
        self.last_sync_error = sync_error;

        if sync_error >= self.config.reset_time {
            self.resync(device_ticks, host_utime);
            warn!(
                sync_error,
                resync_count = self.resync_count,
                "device clock out of tolerance, forcing resync"
            );
            return Ok(SyncOutcome::ForcedResync);
        }

        // One-sided: only move the anchor forward when the device is not
        // running fast beyond the declared rate error.
        if dp >= dq - (self.config.rate_error * dp).abs() {
            self.anchor = Some(Anchor {
                device_ticks,
                host_utime,
            });
        }

        Ok(SyncOutcome::Synced)
    }

    /// Estimate the host time (microseconds) at which the device read
    /// `raw_device_ticks`.
    ///
    /// The tick is placed in the current epoch unless that would put it more
    /// than half a wrap past the most recent update, in which case it belongs
    /// to the previous epoch. Earlier epochs are not resolved.
    pub fn get_host_utime(&self, raw_device_ticks: i64) -> Result<i64> {
        let anchor = self.anchor.ok_or(TimeSyncError::NotSynchronized)?;
        self.check_raw(raw_device_ticks)?;

        let mut device_ticks = self.device_ticks_offset + raw_device_ticks;
        if let Some(wrap) = self.config.tick_wrap {
            if raw_device_ticks - self.last_raw_ticks > wrap / 2 {
                device_ticks -= wrap;
            }
        }

        let dp = (device_ticks - anchor.device_ticks) as f64 / self.config.ticks_per_second;
        let elapsed = (dp * MICROS_PER_SECOND).round() as i64;
        let margin = (MICROS_PER_SECOND * (self.config.rate_error * dp).abs()).round() as i64;

        Ok(anchor.host_utime + elapsed + margin)
    }

    /// Forget the anchor. The next `update` re-anchors and counts a resync.
    pub fn reset(&mut self) {
        self.anchor = None;
    }

    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    /// Number of forced resynchronizations, including the first anchor.
    pub fn resync_count(&self) -> u32 {
        self.resync_count
    }

    /// Clock disagreement (seconds) observed by the latest `update`.
    pub fn last_sync_error(&self) -> f64 {
        self.last_sync_error
    }

    pub fn last_raw_ticks(&self) -> i64 {
        self.last_raw_ticks
    }

    pub fn config(&self) -> &TimeSyncConfig {
        &self.config
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            synced: self.is_synced(),
            resync_count: self.resync_count,
            last_sync_error: self.last_sync_error,
            last_raw_ticks: self.last_raw_ticks,
            device_ticks_offset: self.device_ticks_offset,
        }
    }

    fn check_raw(&self, raw_device_ticks: i64) -> Result<()> {
        if raw_device_ticks < 0 {
            return Err(TimeSyncError::NegativeTicks(raw_device_ticks));
        }
        match self.config.tick_wrap {
            Some(wrap) if raw_device_ticks >= wrap => Err(TimeSyncError::TicksOutOfRange {
                ticks: raw_device_ticks,
                wrap,
            }),
            _ => Ok(()),
        }
    }

    fn resync(&mut self, device_ticks: i64, host_utime: i64) {
        self.anchor = Some(Anchor {
            device_ticks,
            host_utime,
        });
        self.resync_count += 1;
    }
}
