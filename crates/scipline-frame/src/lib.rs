//! SCIP2.0 line framing and response assembly.
//!
//! Devices speak newline-terminated ASCII. A reply is a run of lines ended by
//! a blank line:
//! - line 0 echoes the command and the 8-hex-digit transaction id
//! - line 1 carries a two-character status and a checksum byte
//! - remaining lines are payload, each ending in a checksum byte
//!
//! This layer turns raw bytes into checksum-verifiable [`Response`] values
//! and encodes outgoing commands. It knows nothing about transactions.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod reader;
pub mod response;
pub mod writer;

pub use checksum::{checksum, validate};
pub use codec::{encode_command, FrameConfig, LineFramer, DEFAULT_MAX_LINE_LENGTH, XID_DIGITS};
pub use error::{FrameError, Result};
pub use reader::ResponseReader;
pub use response::{Line, Response, STREAMING_STATUS};
pub use writer::CommandWriter;
