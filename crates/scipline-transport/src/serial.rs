use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::error::Result;

/// Read timeout applied when the caller asks for fully blocking reads.
/// The serialport crate always wants a finite timeout.
pub(crate) const BLOCKING_READ_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Open a serial device configured for SCIP: 8N1, no flow control, raw mode.
pub fn open(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(BLOCKING_READ_TIMEOUT)
        .open()?;

    info!(path, baud_rate, "opened serial port");
    Ok(port)
}

/// Map an optional timeout to the finite value serialport expects.
pub(crate) fn effective_timeout(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(t) if !t.is_zero() => t,
        _ => BLOCKING_READ_TIMEOUT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_device_fails() {
        let result = open("/dev/scipline-does-not-exist", 115_200);
        assert!(result.is_err());
    }

    #[test]
    fn zero_or_none_timeout_means_blocking() {
        assert_eq!(effective_timeout(None), BLOCKING_READ_TIMEOUT);
        assert_eq!(effective_timeout(Some(Duration::ZERO)), BLOCKING_READ_TIMEOUT);
        assert_eq!(
            effective_timeout(Some(Duration::from_millis(50))),
            Duration::from_millis(50)
        );
    }
}
