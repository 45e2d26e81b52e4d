use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use scipline_transport::ScipStream;

use crate::codec::{encode_command, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete commands to any `Write` stream.
///
/// Each [`send`](Self::send) encodes the full command line into one buffer
/// and writes it out before returning, so a caller holding the writer
/// exclusively never interleaves with another command.
pub struct CommandWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> CommandWriter<T> {
    /// Create a new command writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new command writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode `<command>;<xid>\n` and write it out (blocking).
    ///
    /// A write that times out (`WouldBlock` or `TimedOut`) fails the send;
    /// part of the line may already be on the wire.
    pub fn send(&mut self, command: &str, xid: u32) -> Result<()> {
        self.buf.clear();
        encode_command(command, xid, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl CommandWriter<ScipStream> {
    /// Create a writer for `ScipStream` and apply the write timeout from config.
    pub fn with_config_stream(mut inner: ScipStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
