use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scipline_engine::Engine;
use scipline_timesync::{ClockSync, TimeSyncConfig, TimeSyncError};
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::info::{property, query_properties};
use crate::cmd::monitor::host_now_utime;
use crate::cmd::{connect, parse_duration, DriftArgs};
use crate::exit::{timesync_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

/// One comparison of the device `TIME` property against the host clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct DriftSample {
    sample: u64,
    /// `TIME` exactly as the device reported it.
    device_time: String,
    /// Device ticks with counter wraps unrolled.
    device_ticks: i64,
    /// Host seconds since the first sample.
    elapsed_s: f64,
    /// Change in (host - device) since the first sample, in seconds.
    delta_s: f64,
    /// `delta_s / elapsed_s`; positive when the device clock runs slow.
    delta_rate: f64,
    sync_error_s: f64,
    resyncs: u32,
}

#[derive(Debug, Clone, Copy)]
struct Origin {
    host_utime: i64,
    device_ticks: i64,
}

/// Drift bookkeeping; the clock estimator unrolls the 24-bit counter.
struct DriftTracker {
    clock: ClockSync,
    origin: Option<Origin>,
    samples: u64,
}

impl DriftTracker {
    fn new(clock: ClockSync) -> Self {
        Self {
            clock,
            origin: None,
            samples: 0,
        }
    }

    fn observe(
        &mut self,
        host_utime: i64,
        raw_ticks: i64,
        device_time: &str,
    ) -> Result<DriftSample, TimeSyncError> {
        self.clock.update(host_utime, raw_ticks)?;
        let stats = self.clock.stats();
        let device_ticks = stats.device_ticks_offset + raw_ticks;

        let origin = *self.origin.get_or_insert(Origin {
            host_utime,
            device_ticks,
        });
        let elapsed_s = (host_utime - origin.host_utime) as f64 / 1.0e6;
        let device_elapsed_s =
            (device_ticks - origin.device_ticks) as f64 / self.clock.config().ticks_per_second;
        let delta_s = elapsed_s - device_elapsed_s;
        let delta_rate = if elapsed_s > 0.0 { delta_s / elapsed_s } else { 0.0 };

        self.samples += 1;
        Ok(DriftSample {
            sample: self.samples,
            device_time: device_time.to_string(),
            device_ticks,
            elapsed_s,
            delta_s,
            delta_rate,
            sync_error_s: stats.last_sync_error,
            resyncs: stats.resync_count,
        })
    }
}

pub fn run(args: DriftArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let timeout = parse_duration(&args.timeout)?;
    let clock = ClockSync::with_config(TimeSyncConfig::hokuyo())
        .map_err(|err| timesync_error("clock setup failed", err))?;

    let engine = connect(&args.device)?;
    let result = measure(&engine, &args, interval, timeout, clock, format);
    engine.close();

    let samples = result?;
    if matches!(format, OutputFormat::Table) {
        print_table(&samples);
    }
    Ok(SUCCESS)
}

fn measure(
    engine: &Engine,
    args: &DriftArgs,
    interval: Duration,
    timeout: Duration,
    clock: ClockSync,
    format: OutputFormat,
) -> CliResult<Vec<DriftSample>> {
    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|err| CliError::new(INTERNAL, format!("failed to install Ctrl-C handler: {err}")))?;

    let mut tracker = DriftTracker::new(clock);
    let mut samples = Vec::new();
    loop {
        let properties = query_properties(engine, timeout)?;
        let host_utime = host_now_utime();
        let device_time = property(&properties, "TIME")
            .ok_or_else(|| CliError::new(DATA_INVALID, "missing property: TIME"))?;
        let raw_ticks = i64::from_str_radix(device_time.trim(), 16).map_err(|_| {
            CliError::new(DATA_INVALID, format!("TIME is not hexadecimal: {device_time}"))
        })?;

        let sample = tracker
            .observe(host_utime, raw_ticks, device_time)
            .map_err(|err| timesync_error("clock update failed", err))?;
        debug!(sample = sample.sample, raw_ticks, "device time sampled");
        print_sample(&sample, format);
        samples.push(sample);

        if args.samples.is_some_and(|limit| tracker.samples >= limit) {
            break;
        }
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => continue,
        }
    }

    if let Some(last) = samples.last() {
        info!(
            samples = last.sample,
            delta_s = %format_args!("{:.6}", last.delta_s),
            delta_rate = %format_args!("{:.6}", last.delta_rate),
            "drift measurement finished"
        );
    }
    Ok(samples)
}

fn print_sample(sample: &DriftSample, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(sample).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "delta: {:15.6} delta rate: {:15.6} time: {}",
                sample.delta_s, sample.delta_rate, sample.device_time
            );
        }
        OutputFormat::Table => {}
    }
}

fn print_table(samples: &[DriftSample]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["SAMPLE", "TIME", "ELAPSED", "DELTA", "DELTA RATE", "RESYNCS"]);
    for sample in samples {
        table.add_row(vec![
            sample.sample.to_string(),
            sample.device_time.clone(),
            format!("{:.3}", sample.elapsed_s),
            format!("{:.6}", sample.delta_s),
            format!("{:.6}", sample.delta_rate),
            sample.resyncs.to_string(),
        ]);
    }
    println!("{table}");
}
