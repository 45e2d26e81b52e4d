//! Client engine for SCIP2.0 laser range finders.
//!
//! scipline talks to Hokuyo-style line protocols over serial or TCP: it
//! multiplexes concurrent request/response transactions over one link while
//! continuous scan data streams in, and maps the device's wrapping tick
//! counter onto host time.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial and TCP byte streams, endpoint parsing
//! - [`frame`]: Line framing, checksums, responses, command encoding
//! - [`timesync`]: Passive device-to-host clock synchronization
//! - [`engine`]: Transactions, stream routing, reader loop (behind `engine` feature)

/// Re-export transport types.
pub mod transport {
    pub use scipline_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use scipline_frame::*;
}

/// Re-export clock synchronization types.
pub mod timesync {
    pub use scipline_timesync::*;
}

/// Re-export engine types (requires `engine` feature).
#[cfg(feature = "engine")]
pub mod engine {
    pub use scipline_engine::*;
}
