/// Errors that can occur in engine operations.
///
/// A transaction that times out is not an error: it resolves to `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] scipline_transport::TransportError),

    /// Frame-level error (including failed command writes).
    #[error("frame error: {0}")]
    Frame(#[from] scipline_frame::FrameError),

    /// The connection is gone; no further transactions can complete.
    #[error("engine closed: {0}")]
    Closed(String),

    /// The id was never submitted on this engine, or was already awaited.
    #[error("no such transaction: {0:08x}")]
    UnknownTransaction(u32),

    /// Failed to start the reader thread.
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
