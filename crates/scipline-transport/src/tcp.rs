use std::net::TcpStream;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Connect to an Ethernet sensor.
///
/// Nagle is disabled: commands are short and latency matters more than
/// packet count.
pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).map_err(|e| TransportError::Connect {
        endpoint: format!("tcp://{host}:{port}"),
        source: e,
    })?;

    if let Err(err) = stream.set_nodelay(true) {
        debug!(%err, "failed to set TCP_NODELAY");
    }

    info!(host, port, "connected to tcp sensor");
    Ok(stream)
}
