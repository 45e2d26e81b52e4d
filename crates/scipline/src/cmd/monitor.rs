use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scipline_engine::{Engine, EngineStats};
use scipline_frame::Response;
use scipline_timesync::{ClockSync, SyncOutcome, SyncStats, TimeSyncConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::info::{property, query_properties};
use crate::cmd::{connect, parse_duration, MonitorArgs};
use crate::exit::{
    engine_error, timesync_error, CliError, CliResult, DATA_INVALID, FAILURE,
    HEALTH_CHECK_FAILED, INTERNAL, SUCCESS, TIMEOUT,
};
use crate::output::OutputFormat;

const COMMAND_TIMEOUT_MS: u64 = 1000;
const SUMMARY_INTERVAL: Duration = Duration::from_secs(1);
const STOP_POLL: Duration = Duration::from_millis(100);
/// Six-bit characters in a scan timestamp.
const TIMESTAMP_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    Interrupted,
    Watchdog,
    Count,
    Closed,
}

#[derive(Serialize)]
struct MonitorReport {
    command: String,
    stop_reason: StopReason,
    scans: u64,
    bad_timestamps: u64,
    /// Host-time estimate (microseconds) for the device timestamp of the last scan.
    last_scan_utime: Option<i64>,
    /// Arrival time minus that estimate for the last scan.
    last_latency_us: Option<i64>,
    sync: SyncStats,
    engine: EngineStats,
}

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let watchdog = parse_duration(&args.watchdog)?;
    let clock = ClockSync::with_config(TimeSyncConfig::hokuyo())
        .map_err(|err| timesync_error("clock setup failed", err))?;

    let engine = connect(&args.device)?;
    let result = stream(&engine, &args, watchdog, clock);
    engine.close();

    let report = result?;
    print_report(&report, format);
    Ok(match report.stop_reason {
        StopReason::Watchdog => HEALTH_CHECK_FAILED,
        StopReason::Closed => FAILURE,
        StopReason::Interrupted | StopReason::Count => SUCCESS,
    })
}

fn stream(
    engine: &Engine,
    args: &MonitorArgs,
    watchdog: Duration,
    clock: ClockSync,
) -> CliResult<MonitorReport> {
    let command = match &args.command {
        Some(command) => command.clone(),
        None => default_command(engine, args.intensities)?,
    };

    let (stop_tx, stop_rx) = mpsc::channel();
    let got_scan = Arc::new(AtomicBool::new(false));
    let monitor = Arc::new(Mutex::new(ScanMonitor::new(clock, Instant::now())));

    engine.set_stream_handler({
        let monitor = Arc::clone(&monitor);
        let got_scan = Arc::clone(&got_scan);
        let stop_tx = stop_tx.clone();
        let limit = args.count;
        move |response: Response| {
            got_scan.store(true, Ordering::Relaxed);
            let mut monitor = monitor.lock().unwrap_or_else(PoisonError::into_inner);
            monitor.record(&response, host_now_utime(), Instant::now());
            if limit.is_some_and(|limit| monitor.scans >= limit) {
                let _ = stop_tx.send(StopReason::Count);
            }
        }
    });

    ctrlc::set_handler({
        let stop_tx = stop_tx.clone();
        move || {
            let _ = stop_tx.send(StopReason::Interrupted);
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("failed to install Ctrl-C handler: {err}")))?;

    let ack = engine
        .transact(&command, COMMAND_TIMEOUT_MS)
        .map_err(|err| engine_error("start streaming failed", err))?
        .ok_or_else(|| CliError::new(TIMEOUT, format!("no reply to {command}")))?;
    if ack.status() != Some("00") {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "{command} rejected with status {}",
                ack.status().unwrap_or("?")
            ),
        ));
    }
    info!(%command, "streaming started");

    spawn_watchdog(watchdog, got_scan, stop_tx);

    let stop_reason = loop {
        match stop_rx.recv_timeout(STOP_POLL) {
            Ok(reason) => break reason,
            Err(RecvTimeoutError::Timeout) if engine.is_closed() => break StopReason::Closed,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break StopReason::Closed,
        }
    };
    info!(reason = ?stop_reason, "stopping");

    engine.clear_stream_handler();
    if stop_reason != StopReason::Closed {
        match engine.transact("QT", COMMAND_TIMEOUT_MS) {
            Ok(Some(_)) => debug!("streaming stopped"),
            Ok(None) => warn!("no reply to QT"),
            Err(err) => warn!(%err, "failed to stop streaming"),
        }
    }

    let monitor = monitor.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(MonitorReport {
        command,
        stop_reason,
        scans: monitor.scans,
        bad_timestamps: monitor.bad_timestamps,
        last_scan_utime: monitor.last_scan_utime,
        last_latency_us: monitor.last_latency_us,
        sync: monitor.clock.stats(),
        engine: engine.stats(),
    })
}

/// Every interval, require that at least one scan arrived since the last check.
fn spawn_watchdog(interval: Duration, got_scan: Arc<AtomicBool>, stop_tx: mpsc::Sender<StopReason>) {
    thread::spawn(move || loop {
        got_scan.store(false, Ordering::Relaxed);
        thread::sleep(interval);
        if !got_scan.load(Ordering::Relaxed) {
            warn!(?interval, "watchdog: no scan received");
            let _ = stop_tx.send(StopReason::Watchdog);
            return;
        }
    });
}

/// Full-range streaming command from the device's AMIN/AMAX properties.
fn default_command(engine: &Engine, intensities: bool) -> CliResult<String> {
    let properties = query_properties(engine, Duration::from_millis(COMMAND_TIMEOUT_MS))?;
    let step = |key: &str| -> CliResult<u32> {
        property(&properties, key)
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| CliError::new(DATA_INVALID, format!("missing property: {key}")))
    };
    Ok(scan_command(step("AMIN")?, step("AMAX")?, intensities))
}

/// `MD`/`ME` with cluster count, scan interval and scan count; a scan count
/// of zero streams until `QT`.
fn scan_command(first_step: u32, last_step: u32, intensities: bool) -> String {
    if intensities {
        // Halve resolution so intensity data still arrives at full rate.
        format!("ME{first_step:04}{last_step:04}02000")
    } else {
        format!("MD{first_step:04}{last_step:04}00000")
    }
}

/// Decode SCIP's big-endian six-bit ASCII encoding.
fn sixbit_decode(chars: &[u8]) -> u32 {
    chars.iter().fold(0u32, |acc, &c| {
        (acc << 6) | u32::from(c.wrapping_sub(0x30) & 0x3f)
    })
}

/// Device timestamp carried at the start of the first data line.
fn scan_timestamp(response: &Response) -> Option<u32> {
    let line = response.line(2)?.body();
    line.get(..TIMESTAMP_CHARS).map(sixbit_decode)
}

pub(crate) fn host_now_utime() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Summary {
    rate_hz: f64,
    kib_per_s: f64,
    sync_error: f64,
    resyncs: u32,
    device_ticks: i64,
    scan_utime: Option<i64>,
    latency_us: Option<i64>,
}

/// Scan bookkeeping owned by the stream handler.
struct ScanMonitor {
    clock: ClockSync,
    scans: u64,
    bad_timestamps: u64,
    last_scan_utime: Option<i64>,
    last_latency_us: Option<i64>,
    summary_scans: u64,
    summary_bytes: usize,
    last_summary: Instant,
}

impl ScanMonitor {
    fn new(clock: ClockSync, now: Instant) -> Self {
        Self {
            clock,
            scans: 0,
            bad_timestamps: 0,
            last_scan_utime: None,
            last_latency_us: None,
            summary_scans: 0,
            summary_bytes: 0,
            last_summary: now,
        }
    }

    /// Account for one scan received at `host_utime`.
    fn record(&mut self, response: &Response, host_utime: i64, now: Instant) {
        self.scans += 1;
        self.summary_scans += 1;
        self.summary_bytes += response.byte_len();

        if let Some(estimate) = self.stamp(response, host_utime) {
            self.last_scan_utime = Some(estimate);
            self.last_latency_us = Some(host_utime - estimate);
        }
        if let Some(summary) = self.summarize(now) {
            info!(
                rate_hz = %format_args!("{:.2}", summary.rate_hz),
                kib_per_s = %format_args!("{:.2}", summary.kib_per_s),
                sync_error = %format_args!("{:.3}", summary.sync_error),
                resyncs = summary.resyncs,
                devtime = %format_args!("{:06x}", summary.device_ticks),
                scan_utime = summary.scan_utime,
                latency_us = summary.latency_us,
                "scan summary"
            );
        }
    }

    fn stamp(&mut self, response: &Response, host_utime: i64) -> Option<i64> {
        let Some(ticks) = scan_timestamp(response) else {
            self.bad_timestamps += 1;
            warn!(command = ?response.command(), "scan without timestamp");
            return None;
        };

        match self.clock.update(host_utime, i64::from(ticks)) {
            Ok(SyncOutcome::Synced) => {}
            Ok(SyncOutcome::ForcedResync) => debug!(ticks, "clock resynchronized"),
            Err(err) => {
                warn!(%err, "clock update failed");
                return None;
            }
        }
        self.clock.get_host_utime(i64::from(ticks)).ok()
    }

    fn summarize(&mut self, now: Instant) -> Option<Summary> {
        let dt = now.saturating_duration_since(self.last_summary);
        if dt <= SUMMARY_INTERVAL {
            return None;
        }
        let secs = dt.as_secs_f64();
        let summary = Summary {
            rate_hz: self.summary_scans as f64 / secs,
            kib_per_s: self.summary_bytes as f64 / secs / 1024.0,
            sync_error: self.clock.last_sync_error(),
            resyncs: self.clock.resync_count(),
            device_ticks: self.clock.last_raw_ticks(),
            scan_utime: self.last_scan_utime,
            latency_us: self.last_latency_us,
        };
        self.summary_scans = 0;
        self.summary_bytes = 0;
        self.last_summary = now;
        Some(summary)
    }
}

fn print_report(report: &MonitorReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "COMMAND",
                    "STOP",
                    "SCANS",
                    "RESYNCS",
                    "SYNC ERROR",
                    "LATENCY",
                    "CHECKSUM ERRORS",
                ])
                .add_row(vec![
                    report.command.clone(),
                    format!("{:?}", report.stop_reason),
                    report.scans.to_string(),
                    report.sync.resync_count.to_string(),
                    format!("{:.3}", report.sync.last_sync_error),
                    latency_text(report.last_latency_us),
                    report.engine.checksum_errors.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "command={} stop={:?} scans={} resyncs={} sync_error={:.3}s latency={}",
                report.command,
                report.stop_reason,
                report.scans,
                report.sync.resync_count,
                report.sync.last_sync_error,
                latency_text(report.last_latency_us)
            );
        }
    }
}

fn latency_text(latency_us: Option<i64>) -> String {
    latency_us.map_or_else(|| "-".to_string(), |us| format!("{:.3}ms", us as f64 / 1000.0))
}
