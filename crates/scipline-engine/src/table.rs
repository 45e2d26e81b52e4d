//! Live transaction table.
//!
//! Each outstanding transaction owns a one-shot reply channel. The table maps
//! transaction ids to the sending half; the reader loop removes the entry and
//! sends the matched response, waking exactly the one waiting caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use scipline_frame::Response;

use crate::error::{EngineError, Result};

/// What a waiting caller eventually receives.
pub(crate) type Reply = Result<Response>;

/// Outcome of handing a response to the table.
#[derive(Debug)]
pub enum Delivery {
    /// A waiter owned the id and now owns the response.
    Delivered,
    /// No live transaction has this id (timed out, never sent, or a
    /// duplicate). The response is handed back for discarding.
    UnknownId(Response),
    /// The id was live but its waiter had already gone away; the response
    /// was dropped.
    Abandoned,
}

#[derive(Default)]
struct TableState {
    pending: HashMap<u32, SyncSender<Reply>>,
    closed: Option<String>,
}

/// Map from transaction id to reply channel, shared by callers and the
/// reader loop.
#[derive(Default)]
pub struct TransactionTable {
    state: Mutex<TableState>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiting transaction and return its reply receiver.
    ///
    /// Fails once the table has been closed, so a transaction can never be
    /// registered after the pending set was failed.
    pub(crate) fn register(&self, xid: u32) -> Result<Receiver<Reply>> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(EngineError::Closed(reason.clone()));
        }
        let (tx, rx) = mpsc::sync_channel(1);
        state.pending.insert(xid, tx);
        Ok(rx)
    }

    /// Hand a response to the transaction with this id.
    ///
    /// The entry is removed first: at most one response is ever delivered
    /// per id.
    pub fn deliver(&self, xid: u32, response: Response) -> Delivery {
        let Some(tx) = self.take(xid) else {
            return Delivery::UnknownId(response);
        };

        match tx.try_send(Ok(response)) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Abandoned,
        }
    }

    /// Claim the reply channel for `xid`. The claimant must send on it or
    /// drop it without blocking.
    pub(crate) fn take(&self, xid: u32) -> Option<SyncSender<Reply>> {
        self.lock().pending.remove(&xid)
    }

    /// Drop a transaction. Returns false if it was no longer live.
    pub fn remove(&self, xid: u32) -> bool {
        self.lock().pending.remove(&xid).is_some()
    }

    /// Close the table and release every waiter with `EngineError::Closed`.
    ///
    /// Only the first reason is kept.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<SyncSender<Reply>> = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_string());
            }
            state.pending.drain().map(|(_, tx)| tx).collect()
        };

        let count = drained.len();
        for tx in drained {
            let _ = tx.try_send(Err(EngineError::Closed(reason.to_string())));
        }
        count
    }

    /// Why the table was closed, if it was.
    pub fn close_reason(&self) -> Option<String> {
        self.lock().closed.clone()
    }

    /// Number of live transactions.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local transaction id counter.
///
/// Seeded randomly so that processes restarted against the same device are
/// unlikely to collide with stale replies; wraps silently.
#[derive(Debug)]
pub struct XidGenerator {
    next: AtomicU32,
}

impl XidGenerator {
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            next: AtomicU32::new(seed),
        }
    }

    pub fn next_xid(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for XidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use scipline_frame::Line;

    use super::*;

    fn reply_for(xid: u32) -> Response {
        Response::from_lines(vec![
            Line::new(format!("VV;{xid:08x}\n").into_bytes()),
            Line::new(&b"00P\n"[..]),
            Line::new(&b"\n"[..]),
        ])
    }

    #[test]
    fn deliver_wakes_registered_waiter() {
        let table = TransactionTable::new();
        let rx = table.register(7).unwrap();
        assert_eq!(table.len(), 1);

        assert!(matches!(table.deliver(7, reply_for(7)), Delivery::Delivered));
        let got = rx.recv().unwrap().unwrap();
        assert_eq!(got.transaction_id(), Some(7));
        assert!(table.is_empty());
    }

    #[test]
    fn second_delivery_for_same_id_is_unknown() {
        let table = TransactionTable::new();
        let _rx = table.register(1).unwrap();
        assert!(matches!(table.deliver(1, reply_for(1)), Delivery::Delivered));
        assert!(matches!(
            table.deliver(1, reply_for(1)),
            Delivery::UnknownId(_)
        ));
    }

    #[test]
    fn removed_id_is_unknown() {
        let table = TransactionTable::new();
        let _rx = table.register(3).unwrap();
        assert!(table.remove(3));
        assert!(!table.remove(3));

        match table.deliver(3, reply_for(3)) {
            Delivery::UnknownId(r) => assert_eq!(r.transaction_id(), Some(3)),
            other => panic!("expected unknown id, got {other:?}"),
        }
    }

    #[test]
    fn dropped_receiver_is_abandoned() {
        let table = TransactionTable::new();
        drop(table.register(9).unwrap());
        assert!(matches!(
            table.deliver(9, reply_for(9)),
            Delivery::Abandoned
        ));
    }

    #[test]
    fn fail_all_releases_waiters_and_blocks_new_ones() {
        let table = TransactionTable::new();
        let a = table.register(1).unwrap();
        let b = table.register(2).unwrap();

        assert_eq!(table.fail_all("device unplugged"), 2);
        for rx in [a, b] {
            assert!(matches!(rx.recv().unwrap(), Err(EngineError::Closed(_))));
        }

        assert!(matches!(table.register(3), Err(EngineError::Closed(r)) if r == "device unplugged"));
        table.fail_all("second reason");
        assert_eq!(table.close_reason().as_deref(), Some("device unplugged"));
    }

    #[test]
    fn permuted_delivery_reaches_matching_waiters() {
        let table = Arc::new(TransactionTable::new());
        let ids: Vec<u32> = (100..116).collect();

        let waiters: Vec<_> = ids
            .iter()
            .map(|&xid| {
                let rx = table.register(xid).unwrap();
                std::thread::spawn(move || {
                    let response = rx
                        .recv_timeout(Duration::from_secs(5))
                        .unwrap()
                        .unwrap();
                    (xid, response.transaction_id())
                })
            })
            .collect();

        // Deliver in a scrambled order.
        let mut order = ids.clone();
        order.reverse();
        order.swap(0, 7);
        order.swap(3, 12);
        for xid in order {
            assert!(matches!(table.deliver(xid, reply_for(xid)), Delivery::Delivered));
        }

        for waiter in waiters {
            let (xid, got) = waiter.join().unwrap();
            assert_eq!(got, Some(xid));
        }
    }

    #[test]
    fn xids_increment_and_wrap() {
        let xids = XidGenerator::with_seed(u32::MAX - 1);
        assert_eq!(xids.next_xid(), u32::MAX - 1);
        assert_eq!(xids.next_xid(), u32::MAX);
        assert_eq!(xids.next_xid(), 0);
    }
}
