use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::{serial, tcp};

/// A connected sensor stream implementing Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// Use [`ScipStream::try_clone`] to obtain an independent handle so reads and
/// writes can happen on different threads.
pub struct ScipStream {
    inner: ScipStreamInner,
}

enum ScipStreamInner {
    Serial(Box<dyn SerialPort>),
    Tcp(TcpStream),
}

impl Read for ScipStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ScipStreamInner::Serial(port) => port.read(buf),
            ScipStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for ScipStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ScipStreamInner::Serial(port) => port.write(buf),
            ScipStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            ScipStreamInner::Serial(port) => port.flush(),
            ScipStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl ScipStream {
    /// Wrap an already-open serial port.
    pub fn from_serial(port: Box<dyn SerialPort>) -> Self {
        Self {
            inner: ScipStreamInner::Serial(port),
        }
    }

    /// Wrap an already-connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: ScipStreamInner::Tcp(stream),
        }
    }

    /// Set read timeout on the underlying stream. `None` blocks indefinitely.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            ScipStreamInner::Serial(port) => {
                port.set_timeout(serial::effective_timeout(timeout))?;
                Ok(())
            }
            ScipStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout. Serial ports share one timeout for both directions,
    /// so this is a no-op there.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            ScipStreamInner::Serial(_) => Ok(()),
            ScipStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            ScipStreamInner::Serial(port) => ScipStreamInner::Serial(port.try_clone()?),
            ScipStreamInner::Tcp(stream) => ScipStreamInner::Tcp(stream.try_clone()?),
        };
        debug!(transport = self.transport_name(), "cloned stream handle");
        Ok(Self { inner })
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            ScipStreamInner::Serial(_) => "serial",
            ScipStreamInner::Tcp(_) => "tcp",
        }
    }
}

impl std::fmt::Debug for ScipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScipStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

/// Open a stream to the given endpoint.
pub fn connect(endpoint: &Endpoint) -> Result<ScipStream> {
    match endpoint {
        Endpoint::Serial { path, baud_rate } => {
            serial::open(path, *baud_rate).map(ScipStream::from_serial)
        }
        Endpoint::Tcp { host, port } => tcp::connect(host, *port).map(ScipStream::from_tcp),
    }
}

/// Parse `path_or_url` and open a stream to it.
///
/// `path_or_url` is either a serial device path (e.g. `/dev/ttyACM0`) or a
/// `tcp://host:port` URL.
pub fn connect_str(path_or_url: &str) -> Result<ScipStream> {
    connect(&Endpoint::parse(path_or_url)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn tcp_stream_clone_shares_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("tcp://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let handle = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            peer.read_exact(&mut buf).unwrap();
            peer.write_all(&buf).unwrap();
        });

        let mut writer = connect_str(&url).unwrap();
        let mut reader = writer.try_clone().unwrap();
        assert_eq!(reader.transport_name(), "tcp");

        writer.write_all(b"QT;\n").unwrap();
        let mut echoed = [0u8; 4];
        reader.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"QT;\n");

        handle.join().unwrap();
    }

    #[test]
    fn read_timeout_surfaces_as_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut stream = connect(&Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        })
        .unwrap();
        let _peer = listener.accept().unwrap();

        stream
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let mut buf = [0u8; 1];
        let err = stream.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn connect_str_rejects_invalid_endpoint() {
        let err = connect_str("tcp://").unwrap_err();
        assert!(matches!(err, crate::TransportError::InvalidEndpoint(_)));
    }
}
