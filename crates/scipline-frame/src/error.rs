/// Errors that can occur during framing and validation.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A line's trailing checksum byte does not match its contents.
    #[error("bad checksum on line {line}: expected {expected:?}, got {actual:?}")]
    Checksum {
        line: usize,
        expected: char,
        actual: char,
    },

    /// The response has fewer lines than any valid reply.
    #[error("truncated response ({lines} lines)")]
    Truncated { lines: usize },

    /// The command text cannot be sent as a single SCIP line.
    #[error("invalid command {0:?}: must not contain ';', CR or LF")]
    InvalidCommand(String),

    /// An I/O error occurred while reading or writing.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the device.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
