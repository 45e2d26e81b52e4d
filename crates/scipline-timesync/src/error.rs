/// Errors that can occur when converting device ticks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeSyncError {
    /// No `update` has been observed since creation or the last reset.
    #[error("clock not synchronized: call update() first")]
    NotSynchronized,

    /// Device tick counters are non-negative.
    #[error("negative device ticks: {0}")]
    NegativeTicks(i64),

    /// A raw reading must be below the counter's wrap value.
    #[error("device ticks {ticks} out of range for a counter wrapping at {wrap}")]
    TicksOutOfRange { ticks: i64, wrap: i64 },

    /// The configuration cannot produce meaningful estimates.
    #[error("invalid timesync configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TimeSyncError>;
