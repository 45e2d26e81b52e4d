use std::io::{ErrorKind, Read};

use scipline_transport::{ScipStream, TransportError};

use crate::codec::{FrameConfig, LineFramer};
use crate::error::{FrameError, Result};
use crate::response::Response;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete responses from any `Read` stream.
///
/// Handles partial reads internally, so callers always get whole responses.
/// Checksums are not verified here; see [`crate::validate`].
pub struct ResponseReader<T> {
    inner: T,
    framer: LineFramer,
    config: FrameConfig,
}

impl<T: Read> ResponseReader<T> {
    /// Create a new response reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new response reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            framer: LineFramer::with_max_line_length(config.max_line_length),
            config,
        }
    }

    /// Read the next complete response (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Read timeouts surface as `FrameError::Io` with kind `TimedOut` or
    /// `WouldBlock`; buffered partial data is kept, so the call can simply
    /// be repeated.
    pub fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some(response) = self.framer.next_response() {
                return Ok(response);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.framer.push(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl ResponseReader<ScipStream> {
    /// Create a reader for `ScipStream` and apply the read timeout from config.
    pub fn with_config_stream(mut inner: ScipStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) | TransportError::Connect { source: io, .. } => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
