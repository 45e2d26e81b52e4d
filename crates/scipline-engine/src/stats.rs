use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of engine counters. Diagnostic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Complete responses framed by the reader.
    pub responses: u64,
    /// Responses handed to a waiting transaction.
    pub delivered: u64,
    /// Streaming (`99`) responses seen.
    pub streamed: u64,
    /// Responses discarded for a bad checksum.
    pub checksum_errors: u64,
    /// Responses discarded as too short to be replies (stray blank lines).
    pub malformed: u64,
    /// Replies whose transaction id was missing or not live.
    pub unknown_ids: u64,
    /// Transactions that gave up waiting.
    pub timeouts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub responses: AtomicU64,
    pub delivered: AtomicU64,
    pub streamed: AtomicU64,
    pub checksum_errors: AtomicU64,
    pub malformed: AtomicU64,
    pub unknown_ids: AtomicU64,
    pub timeouts: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            responses: self.responses.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            streamed: self.streamed.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown_ids: self.unknown_ids.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
