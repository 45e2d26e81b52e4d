//! Byte-stream transports for SCIP2.0 devices.
//!
//! Provides a unified interface over the two ways a sensor is reached:
//! - a local serial device (USB-ACM or UART)
//! - a TCP socket (`tcp://host:port`, Ethernet-attached sensors)
//!
//! This is the lowest layer of scipline. Everything else builds on top of
//! the [`ScipStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod serial;
pub mod stream;
pub mod tcp;

pub use endpoint::{Endpoint, DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT};
pub use error::{Result, TransportError};
pub use stream::{connect, connect_str, ScipStream};
