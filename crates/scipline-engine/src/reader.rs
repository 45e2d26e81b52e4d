//! The reader loop: sole owner of the transport's read side.

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scipline_frame::{validate, FrameError, Response, ResponseReader};
use tracing::{debug, error, info, trace, warn};

use crate::engine::Shared;
use crate::stats::Counters;
use crate::table::Delivery;

pub(crate) struct ReaderSettings {
    pub read_retry_backoff: Duration,
    pub trace_traffic: bool,
}

/// Closes the engine however the loop exits, including by panic in a
/// stream handler.
struct CloseOnExit<'a> {
    shared: &'a Shared,
    reason: String,
}

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.shared.close(&self.reason);
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

pub(crate) fn run<R: Read>(
    mut reader: ResponseReader<R>,
    shared: Arc<Shared>,
    settings: ReaderSettings,
) {
    let mut exit = CloseOnExit {
        shared: &shared,
        reason: "reader thread panicked".to_string(),
    };

    exit.reason = loop {
        if shared.is_shutting_down() {
            break "engine closed".to_string();
        }

        match reader.read_response() {
            Ok(response) => handle_response(&shared, response, settings.trace_traffic),
            Err(FrameError::Io(err)) if is_transient(&err) => {
                thread::sleep(settings.read_retry_backoff);
            }
            Err(FrameError::ConnectionClosed) => {
                warn!("device closed the connection");
                break "device closed the connection".to_string();
            }
            Err(err) => {
                error!(%err, "fatal read error");
                break format!("read failed: {err}");
            }
        }
    };

    info!(reason = %exit.reason, "reader loop stopped");
}

/// Route one complete response: validate, then stream handler or waiting
/// transaction, otherwise discard.
pub(crate) fn handle_response(shared: &Shared, response: Response, trace_traffic: bool) {
    Counters::bump(&shared.counters.responses);

    if trace_traffic {
        for line in response.lines() {
            debug!(line = %line.text(), "READ");
        }
    }

    if let Err(err) = validate(&response) {
        match err {
            FrameError::Truncated { .. } => {
                Counters::bump(&shared.counters.malformed);
                trace!(%err, "ignoring stray line");
            }
            _ => {
                Counters::bump(&shared.counters.checksum_errors);
                warn!(%err, command = ?response.command(), "discarding response");
            }
        }
        return;
    }

    if response.is_streaming() {
        Counters::bump(&shared.counters.streamed);
        shared.router.route(response);
        return;
    }

    let Some(xid) = response.transaction_id() else {
        Counters::bump(&shared.counters.unknown_ids);
        warn!(command = ?response.command(), "response without transaction id, discarding");
        return;
    };

    match shared.table.deliver(xid, response) {
        Delivery::Delivered => Counters::bump(&shared.counters.delivered),
        Delivery::UnknownId(response) => {
            Counters::bump(&shared.counters.unknown_ids);
            warn!(
                xid = %format_args!("{xid:08x}"),
                command = ?response.command(),
                "unknown transaction, discarding response"
            );
        }
        Delivery::Abandoned => {
            debug!(xid = %format_args!("{xid:08x}"), "waiter went away, discarding response");
        }
    }
}
