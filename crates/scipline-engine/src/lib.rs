//! Transaction multiplexing for SCIP2.0 devices.
//!
//! One [`Engine`] per connection. Any number of threads may issue
//! transactions concurrently while a single reader thread frames replies,
//! validates checksums, and hands each reply to the one caller waiting on
//! its transaction id. Continuous scan data (status `99`) bypasses the
//! transaction table and goes to a stream handler.

pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
mod reader;
pub mod router;
pub mod stats;
pub mod table;

pub use config::{EngineConfig, DEFAULT_POLL_INTERVAL, DEFAULT_READ_RETRY_BACKOFF};
pub use connector::{connect, connect_with_config};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use router::{StreamHandler, StreamRouter};
pub use stats::EngineStats;
pub use table::{Delivery, TransactionTable, XidGenerator};
