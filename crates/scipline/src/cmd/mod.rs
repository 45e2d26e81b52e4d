use std::time::Duration;

use clap::{Args, Subcommand};
use scipline_engine::{Engine, EngineConfig};
use scipline_transport::Endpoint;

use crate::exit::{engine_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod drift;
pub mod info;
pub mod monitor;
pub mod reset;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one transaction and print the reply.
    Send(SendArgs),
    /// Query VV, PP and II and print the device properties.
    Info(InfoArgs),
    /// Reset the device (RS), retrying until it answers.
    Reset(ResetArgs),
    /// Start scan streaming and report rate and clock sync.
    Monitor(MonitorArgs),
    /// Poll the device TIME property and report drift against the host clock.
    Drift(DriftArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Reset(args) => reset::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Drift(args) => drift::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Serial device path, or tcp://host[:port] (default port 10940).
    pub device: String,
    /// Serial baud rate.
    #[arg(long, value_name = "BAUD")]
    pub baud: Option<u32>,
    /// Log every line written and read at debug level.
    #[arg(long)]
    pub trace_traffic: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Command text, without transaction id (e.g. VV, PP, BM).
    pub command: String,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "500ms")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Maximum time to wait for each reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Give up after this many unanswered RS commands.
    #[arg(long, default_value_t = 10)]
    pub attempts: u32,
    /// Wait per attempt (e.g. 200ms).
    #[arg(long, default_value = "200ms")]
    pub timeout: String,
    /// Also send SCIP2.0 to switch older firmware into SCIP 2.0 mode.
    #[arg(long)]
    pub scip2: bool,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Streaming command to issue. Default: full-range MD built from the
    /// device's AMIN/AMAX properties.
    #[arg(long)]
    pub command: Option<String>,
    /// Request range and intensity data (ME) instead of range only (MD).
    #[arg(long, conflicts_with = "command")]
    pub intensities: bool,
    /// Exit with a failure if no scan arrives within this interval.
    #[arg(long, default_value = "2s")]
    pub watchdog: String,
    /// Stop after this many scans.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DriftArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Pause between samples (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Stop after this many samples. Default: run until Ctrl-C.
    #[arg(long)]
    pub samples: Option<u64>,
    /// Maximum time to wait for each property reply.
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open an engine on the requested device.
pub fn connect(args: &DeviceArgs) -> CliResult<Engine> {
    let mut endpoint =
        Endpoint::parse(&args.device).map_err(|err| transport_error("invalid device", err))?;
    if let Some(baud) = args.baud {
        endpoint = endpoint.with_baud_rate(baud);
    }

    let config = EngineConfig {
        trace_traffic: args.trace_traffic,
        ..EngineConfig::default()
    };
    Engine::connect_with_config(&endpoint, config)
        .map_err(|err| engine_error("connect failed", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
