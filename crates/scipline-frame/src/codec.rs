use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::response::{is_terminator, Line, Response};

/// Hex digits in a transaction id.
pub const XID_DIGITS: usize = 8;

/// Default maximum line length, terminator included.
///
/// Longer lines are split at this length rather than buffered without bound.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// Encode a command into the wire format.
///
/// Wire format:
/// ```text
/// <command>;<xid as 8 lowercase hex digits>\n
/// ```
pub fn encode_command(command: &str, xid: u32, dst: &mut BytesMut) -> Result<()> {
    if command.bytes().any(|b| b == b';' || is_terminator(b)) {
        return Err(FrameError::InvalidCommand(command.to_string()));
    }
    dst.reserve(command.len() + 1 + XID_DIGITS + 1);
    dst.put_slice(command.as_bytes());
    dst.put_u8(b';');
    dst.put_slice(format!("{xid:08x}").as_bytes());
    dst.put_u8(b'\n');
    Ok(())
}

/// Incremental decoder from raw bytes to responses.
///
/// Feed bytes with [`push`](Self::push), then drain with
/// [`next_response`](Self::next_response). Lines end on `\n` or `\r`; a
/// `\n` directly after a `\r`-terminated line is swallowed so CRLF devices
/// do not produce spurious blank lines.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    lines: Vec<Line>,
    max_line_length: usize,
    skip_lf: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_line_length.min(DEFAULT_MAX_LINE_LENGTH)),
            lines: Vec::new(),
            max_line_length: max_line_length.max(1),
            skip_lf: false,
        }
    }

    /// Append raw bytes from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Split off the next complete line, if buffered.
    pub fn next_line(&mut self) -> Option<Line> {
        if self.skip_lf {
            let first = *self.buf.first()?;
            if first == b'\n' {
                self.buf.advance(1);
            }
            self.skip_lf = false;
        }

        let limit = self.buf.len().min(self.max_line_length);
        if let Some(pos) = self.buf[..limit].iter().position(|&b| is_terminator(b)) {
            let raw = self.buf.split_to(pos + 1).freeze();
            self.skip_lf = raw[pos] == b'\r';
            return Some(Line::new(raw));
        }

        if self.buf.len() >= self.max_line_length {
            debug!(
                max_line_length = self.max_line_length,
                "line exceeds maximum length, splitting"
            );
            return Some(Line::new(self.buf.split_to(self.max_line_length).freeze()));
        }

        None
    }

    /// Assemble the next complete response, if buffered.
    ///
    /// Lines of a partially received response are kept across calls.
    pub fn next_response(&mut self) -> Option<Response> {
        while let Some(line) = self.next_line() {
            let blank = line.is_blank();
            self.lines.push(line);
            if blank {
                return Some(Response::from_lines(std::mem::take(&mut self.lines)));
            }
        }
        None
    }

    /// Lines collected for the response in progress.
    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    /// Bytes buffered but not yet split into lines.
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Drop all partial state, e.g. after reconnecting.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.lines.clear();
        self.skip_lf = false;
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the line codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes. Default: 8 KiB.
    pub max_line_length: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
