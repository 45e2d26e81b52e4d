use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Overrides `--log-level` when set (e.g. `SCIPLINE_LOG=debug`).
pub const LOG_LEVEL_ENV: &str = "SCIPLINE_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// The level from [`LOG_LEVEL_ENV`], if set to a known level.
    pub fn from_env() -> Option<Self> {
        let value = std::env::var(LOG_LEVEL_ENV).ok()?;
        LogLevel::from_str(value.trim(), true).ok()
    }
}

/// Log to stderr so stdout carries only command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let level = LogLevel::from_env().unwrap_or(level);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
