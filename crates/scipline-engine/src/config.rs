use std::time::Duration;

use scipline_frame::FrameConfig;

/// How often the reader wakes up to check for shutdown when the device is
/// silent.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after a transient read error before reading again.
pub const DEFAULT_READ_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Engine behavior configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Line codec settings. `read_timeout` doubles as the reader's poll
    /// interval on transports that support it.
    pub frame: FrameConfig,
    /// Backoff applied after a transient read error.
    pub read_retry_backoff: Duration,
    /// Log every line read and every command written at `debug` level.
    pub trace_traffic: bool,
    /// Seed for transaction ids. `None` draws a random seed so that restarts
    /// sharing a device are unlikely to reuse ids.
    pub xid_seed: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig {
                read_timeout: Some(DEFAULT_POLL_INTERVAL),
                ..FrameConfig::default()
            },
            read_retry_backoff: DEFAULT_READ_RETRY_BACKOFF,
            trace_traffic: false,
            xid_seed: None,
        }
    }
}
