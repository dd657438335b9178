use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Crates whose events follow `--log-level`; everything else stays at warn.
const CRATE_TARGETS: &[&str] = &["cd11", "cd11_frame", "cd11_station"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter directives for `level`: our crates at `level`, dependencies at
/// `warn` or quieter.
fn default_directives(level: LogLevel) -> String {
    let base = level.min(LogLevel::Warn).as_directive();
    CRATE_TARGETS
        .iter()
        .fold(base.to_string(), |mut acc, target| {
            acc.push_str(&format!(",{target}={}", level.as_directive()));
            acc
        })
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG`, when
/// set and valid, replaces the `--log-level` directives.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
