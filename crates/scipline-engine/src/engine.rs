use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use scipline_frame::{CommandWriter, Response, ResponseReader};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::reader::{self, ReaderSettings};
use crate::router::StreamRouter;
use crate::stats::{Counters, EngineStats};
use crate::table::{Reply, TransactionTable, XidGenerator};

/// State shared between callers and the reader thread.
pub(crate) struct Shared {
    pub table: TransactionTable,
    pub router: StreamRouter,
    pub counters: Counters,
    shutdown: AtomicBool,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            table: TransactionTable::new(),
            router: StreamRouter::new(),
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Stop the reader and release every waiter. Idempotent.
    pub fn close(&self, reason: &str) {
        self.shutdown.store(true, Ordering::Release);
        let failed = self.table.fail_all(reason);
        if failed > 0 {
            warn!(failed, reason, "released pending transactions");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Write half of the connection, erased over the concrete stream type.
trait CommandSink: Send {
    fn send_command(&mut self, command: &str, xid: u32) -> scipline_frame::Result<()>;
}

impl<W: Write + Send> CommandSink for CommandWriter<W> {
    fn send_command(&mut self, command: &str, xid: u32) -> scipline_frame::Result<()> {
        self.send(command, xid)
    }
}

/// A SCIP connection: concurrent transactions plus a streaming data path.
///
/// A dedicated reader thread owns the read side of the transport. Callers on
/// any thread submit commands; each reply is routed back to the one caller
/// waiting on its transaction id. Streaming (`99`) data goes to the stream
/// handler instead.
///
/// Every id returned by [`submit`](Self::submit) should eventually be passed
/// to [`await_response`](Self::await_response), which is what releases it.
pub struct Engine {
    shared: Arc<Shared>,
    writer: Mutex<Box<dyn CommandSink>>,
    receivers: Mutex<HashMap<u32, Receiver<Reply>>>,
    xids: XidGenerator,
    reader: Mutex<Option<JoinHandle<()>>>,
    trace_traffic: bool,
}

impl Engine {
    /// Open `path_or_url` (a serial device path or `tcp://host[:port]`) with
    /// default settings.
    pub fn connect(path_or_url: &str) -> Result<Self> {
        crate::connector::connect(path_or_url)
    }

    /// Open an endpoint with explicit configuration.
    pub fn connect_with_config(
        endpoint: &scipline_transport::Endpoint,
        config: EngineConfig,
    ) -> Result<Self> {
        crate::connector::connect_with_config(endpoint, config)
    }

    /// Run the engine over an arbitrary read/write pair.
    ///
    /// The reader only notices [`close`](Self::close) between reads, so
    /// `reader` should have a read timeout (or reach EOF) for `close` to
    /// return promptly.
    pub fn from_parts<R, W>(reader: R, writer: W, config: EngineConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let reader = ResponseReader::with_config(reader, config.frame.clone());
        let writer = CommandWriter::with_config(writer, config.frame.clone());
        Self::from_framed(reader, writer, config)
    }

    /// Run the engine over an already-framed reader and writer.
    pub fn from_framed<R, W>(
        reader: ResponseReader<R>,
        writer: CommandWriter<W>,
        config: EngineConfig,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let settings = ReaderSettings {
            read_retry_backoff: config.read_retry_backoff,
            trace_traffic: config.trace_traffic,
        };

        let handle = thread::Builder::new()
            .name("scip-reader".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || reader::run(reader, shared, settings)
            })?;

        let xids = match config.xid_seed {
            Some(seed) => XidGenerator::with_seed(seed),
            None => XidGenerator::new(),
        };

        Ok(Self {
            shared,
            writer: Mutex::new(Box::new(writer)),
            receivers: Mutex::new(HashMap::new()),
            xids,
            reader: Mutex::new(Some(handle)),
            trace_traffic: config.trace_traffic,
        })
    }

    fn receivers(&self) -> MutexGuard<'_, HashMap<u32, Receiver<Reply>>> {
        self.receivers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `command` as a new transaction and return its id.
    ///
    /// The transaction is live before the command hits the wire, so a reply
    /// can never overtake its own registration. A write failure unregisters
    /// it and is returned to the caller.
    pub fn submit(&self, command: &str) -> Result<u32> {
        let xid = self.xids.next_xid();
        let rx = self.shared.table.register(xid)?;
        self.receivers().insert(xid, rx);

        let sent = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_command(command, xid);

        if let Err(err) = sent {
            self.shared.table.remove(xid);
            self.receivers().remove(&xid);
            return Err(err.into());
        }

        if self.trace_traffic {
            debug!(command, xid = %format_args!("{xid:08x}"), "WRITE");
        }
        Ok(xid)
    }

    /// Wait for the reply to a submitted transaction.
    ///
    /// `None` or a zero timeout waits indefinitely. Returns `Ok(None)` on
    /// timeout; the transaction is unregistered before this returns, so a
    /// reply arriving later is discarded as an unknown id.
    pub fn await_response(&self, xid: u32, timeout: Option<Duration>) -> Result<Option<Response>> {
        let rx = self
            .receivers()
            .remove(&xid)
            .ok_or(EngineError::UnknownTransaction(xid))?;

        let received = match timeout.filter(|t| !t.is_zero()) {
            Some(timeout) => rx.recv_timeout(timeout),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(reply) => reply.map(Some),
            Err(RecvTimeoutError::Timeout) => {
                if self.shared.table.remove(xid) {
                    Counters::bump(&self.shared.counters.timeouts);
                    debug!(xid = %format_args!("{xid:08x}"), "transaction timed out");
                    return Ok(None);
                }
                // The reader or a close claimed the entry first and sends or
                // drops the sender without blocking.
                match rx.recv() {
                    Ok(reply) => reply.map(Some),
                    Err(_) => Err(self.closed_error()),
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.closed_error()),
        }
    }

    fn closed_error(&self) -> EngineError {
        EngineError::Closed(
            self.shared
                .table
                .close_reason()
                .unwrap_or_else(|| "engine closed".to_string()),
        )
    }

    /// Submit `command` and wait up to `timeout_ms` for its reply (0 waits
    /// indefinitely).
    pub fn transact(&self, command: &str, timeout_ms: u64) -> Result<Option<Response>> {
        let xid = self.submit(command)?;
        self.await_response(xid, Some(Duration::from_millis(timeout_ms)))
    }

    /// Install the callback for streaming data, replacing any previous one.
    ///
    /// It runs on the reader thread, so it must not block or wait on a
    /// transaction.
    pub fn set_stream_handler<F>(&self, handler: F)
    where
        F: FnMut(Response) + Send + 'static,
    {
        self.shared.router.set(Box::new(handler));
    }

    /// Remove the stream handler; streaming data is dropped until a new one
    /// is set.
    pub fn clear_stream_handler(&self) {
        self.shared.router.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.table.close_reason().is_some()
    }

    /// Why the engine closed, if it has.
    pub fn close_reason(&self) -> Option<String> {
        self.shared.table.close_reason()
    }

    /// Number of transactions still waiting for a reply.
    pub fn pending_transactions(&self) -> usize {
        self.shared.table.len()
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }

    /// Shut down: fail pending transactions and join the reader thread.
    ///
    /// Safe to call more than once, and from a stream handler (the reader
    /// is then left to finish on its own).
    pub fn close(&self) {
        self.shared.close("engine closed");

        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("reader thread panicked");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.close("engine dropped");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pending", &self.pending_transactions())
            .field("closed", &self.close_reason())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{self, BufRead, BufReader};
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    use scipline_frame::{checksum, FrameError};

    use super::*;

    struct FakeDevice {
        reader: BufReader<UnixStream>,
        writer: UnixStream,
    }

    impl FakeDevice {
        fn read_command(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).unwrap();
            line.trim_end().to_string()
        }

        fn send(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).unwrap();
        }
    }

    fn with_checksum(data: &str) -> String {
        format!("{data}{}\n", char::from(checksum(data.as_bytes())))
    }

    fn reply(echo: &str, status: &str, data: &[&str]) -> Vec<u8> {
        let mut out = format!("{echo}\n{}", with_checksum(status));
        for line in data {
            out.push_str(&with_checksum(line));
        }
        out.push('\n');
        out.into_bytes()
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            read_retry_backoff: Duration::from_millis(1),
            trace_traffic: true,
            xid_seed: Some(0x100),
            ..EngineConfig::default()
        }
    }

    fn engine_with_device() -> (Engine, FakeDevice) {
        let (host, device) = UnixStream::pair().unwrap();
        let reader = host.try_clone().unwrap();
        reader
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let engine = Engine::from_parts(reader, host, test_config()).unwrap();
        let device = FakeDevice {
            reader: BufReader::new(device.try_clone().unwrap()),
            writer: device,
        };
        (engine, device)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn transact_round_trip() {
        let (engine, mut device) = engine_with_device();

        let server = thread::spawn(move || {
            let command = device.read_command();
            assert_eq!(command, "VV;00000100");
            device.send(&reply(&command, "00", &["FIRM:1.18.1(16/Apr./2008)"]));
            device
        });

        let response = engine.transact("VV", 1000).unwrap().unwrap();
        assert_eq!(response.command(), Some("VV"));
        assert_eq!(response.transaction_id(), Some(0x100));
        assert_eq!(response.status(), Some("00"));
        assert_eq!(engine.pending_transactions(), 0);
        assert_eq!(engine.stats().delivered, 1);

        let _device = server.join().unwrap();
        engine.close();
    }

    #[test]
    fn permuted_replies_reach_their_own_callers() {
        let (engine, mut device) = engine_with_device();
        let engine = Arc::new(engine);
        const CALLERS: usize = 8;

        let server = thread::spawn(move || {
            let mut commands: Vec<String> = (0..CALLERS).map(|_| device.read_command()).collect();
            commands.reverse();
            commands.swap(1, 5);
            for command in &commands {
                device.send(&reply(command, "00", &[]));
            }
            device
        });

        let callers: Vec<_> = (0..CALLERS)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let command = format!("C{i}");
                    let response = engine.transact(&command, 2000).unwrap().unwrap();
                    assert_eq!(response.command(), Some(command.as_str()));
                })
            })
            .collect();

        for caller in callers {
            caller.join().unwrap();
        }
        assert_eq!(engine.stats().delivered, CALLERS as u64);
        assert_eq!(engine.stats().unknown_ids, 0);

        let _device = server.join().unwrap();
        engine.close();
    }

    #[test]
    fn timeout_returns_none_and_late_reply_is_discarded() {
        let (engine, mut device) = engine_with_device();

        let started = Instant::now();
        let result = engine.transact("PP", 50).unwrap();
        let elapsed = started.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1000), "{elapsed:?}");
        assert_eq!(engine.pending_transactions(), 0);
        assert_eq!(engine.stats().timeouts, 1);

        let command = device.read_command();
        device.send(&reply(&command, "00", &[]));
        assert!(wait_until(|| engine.stats().unknown_ids == 1));
        assert!(!engine.is_closed());

        engine.close();
    }

    #[test]
    fn streaming_data_goes_to_handler_not_waiter() {
        let (engine, mut device) = engine_with_device();
        let (tx, streamed) = std::sync::mpsc::channel();
        engine.set_stream_handler(move |response| {
            let _ = tx.send(response);
        });

        let xid = engine.submit("MD0044072501000").unwrap();
        let command = device.read_command();
        // Scan data echoes the same id text as the pending command.
        device.send(&reply(&command, "99", &["0Dh5P"]));
        device.send(&reply(&command, "00", &[]));

        let scan = streamed.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(scan.is_streaming());
        assert_eq!(scan.transaction_id(), Some(xid));

        let ack = engine
            .await_response(xid, Some(Duration::from_secs(2)))
            .unwrap()
            .unwrap();
        assert_eq!(ack.status(), Some("00"));
        assert_eq!(engine.stats().streamed, 1);

        engine.clear_stream_handler();
        engine.close();
    }

    #[test]
    fn bad_checksum_is_skipped_and_connection_survives() {
        let (engine, mut device) = engine_with_device();

        let server = thread::spawn(move || {
            let command = device.read_command();
            device.send(format!("{command}\n00X\n\n").as_bytes());
            device.send(&reply(&command, "00", &[]));
            device
        });

        let response = engine.transact("II", 2000).unwrap().unwrap();
        assert_eq!(response.status(), Some("00"));
        assert_eq!(engine.stats().checksum_errors, 1);

        let _device = server.join().unwrap();
        engine.close();
    }

    #[test]
    fn device_hangup_fails_pending_and_closes() {
        let (engine, mut device) = engine_with_device();
        let engine = Arc::new(engine);

        let caller = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.transact("VV", 0))
        };

        device.read_command();
        drop(device);

        assert!(matches!(caller.join().unwrap(), Err(EngineError::Closed(_))));
        assert!(engine.is_closed());
        assert_eq!(
            engine.close_reason().as_deref(),
            Some("device closed the connection")
        );
        assert!(matches!(
            engine.transact("VV", 10),
            Err(EngineError::Closed(_))
        ));
    }

    #[test]
    fn write_failure_is_returned_to_caller() {
        struct Unplugged;
        impl Write for Unplugged {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (host, _device) = UnixStream::pair().unwrap();
        host.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let engine = Engine::from_parts(host, Unplugged, test_config()).unwrap();

        assert!(matches!(
            engine.transact("VV", 100),
            Err(EngineError::Frame(FrameError::Io(_)))
        ));
        assert_eq!(engine.pending_transactions(), 0);
        engine.close();
    }

    #[test]
    fn stalled_write_fails_the_send_and_frees_the_writer() {
        struct Stalled;
        impl Write for Stalled {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (host, _device) = UnixStream::pair().unwrap();
        host.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let engine = Engine::from_parts(host, Stalled, test_config()).unwrap();

        for command in ["VV", "PP"] {
            assert!(matches!(
                engine.submit(command),
                Err(EngineError::Frame(FrameError::Io(ref e))) if e.kind() == io::ErrorKind::WouldBlock
            ));
        }
        assert_eq!(engine.pending_transactions(), 0);
        engine.close();
    }

    #[test]
    fn reply_claimed_during_timeout_is_still_returned() {
        let (engine, mut device) = engine_with_device();
        let xid = engine.submit("VV").unwrap();
        assert_eq!(device.read_command(), format!("VV;{xid:08x}"));

        let sender = engine.shared.table.take(xid).unwrap();
        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let echo = format!("VV;{xid:08x}");
            let mut reader =
                ResponseReader::new(io::Cursor::new(reply(&echo, "00", &["VEND:x"])));
            sender.send(Ok(reader.read_response().unwrap())).unwrap();
        });

        let response = engine
            .await_response(xid, Some(Duration::from_millis(10)))
            .unwrap()
            .expect("claimed reply should not be reported as a timeout");
        assert_eq!(response.transaction_id(), Some(xid));
        assert_eq!(engine.stats().timeouts, 0);

        late.join().unwrap();
        engine.close();
    }

    #[test]
    fn invalid_command_is_rejected_before_writing() {
        let (engine, _device) = engine_with_device();
        assert!(matches!(
            engine.transact("VV;00000001", 100),
            Err(EngineError::Frame(FrameError::InvalidCommand(_)))
        ));
        assert_eq!(engine.pending_transactions(), 0);
        engine.close();
    }

    #[test]
    fn awaiting_an_unknown_id_fails() {
        let (engine, _device) = engine_with_device();
        assert!(matches!(
            engine.await_response(0xdead, Some(Duration::from_millis(10))),
            Err(EngineError::UnknownTransaction(0xdead))
        ));
        engine.close();
    }

    #[test]
    fn close_releases_waiters_and_joins_reader() {
        let (engine, _device) = engine_with_device();
        let xid = engine.submit("BM").unwrap();

        engine.close();
        engine.close();

        assert!(matches!(
            engine.await_response(xid, None),
            Err(EngineError::Closed(reason)) if reason == "engine closed"
        ));
        assert!(matches!(engine.submit("QT"), Err(EngineError::Closed(_))));
    }
}
