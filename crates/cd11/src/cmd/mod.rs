use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cd11_station::ReceiverConfig;
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::exit::{station_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod connman;
pub mod dataman;
pub mod decode;
pub mod request;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the connection broker on the well-known port.
    Connman(ConnmanArgs),
    /// Run a data receiver per acquired station and print received records.
    Dataman(DatamanArgs),
    /// Act as a station: send a connection request and print the response.
    Request(RequestArgs),
    /// Print one summary per frame in a captured byte stream.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connman(args) => connman::run(args, format),
        Command::Dataman(args) => dataman::run(args, format),
        Command::Request(args) => request::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnmanArgs {
    /// Receiver configuration file (JSON).
    #[arg(long, env = "CD11_CONFIG")]
    pub config: Option<PathBuf>,
    /// Override the well-known port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Override the listen address.
    #[arg(long)]
    pub bind: Option<IpAddr>,
}

#[derive(Args, Debug)]
pub struct DatamanArgs {
    /// Receiver configuration file (JSON).
    #[arg(long, env = "CD11_CONFIG")]
    pub config: PathBuf,
    /// Override the data listen address.
    #[arg(long)]
    pub bind: Option<IpAddr>,
    /// Exit after printing N records.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Broker address (host:port).
    pub addr: SocketAddr,
    /// Station name to request a connection for.
    #[arg(long, short = 's')]
    pub station: String,
    /// Node type announced in the request.
    #[arg(long, default_value = "IDC")]
    pub station_type: String,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding back-to-back frames.
    pub path: PathBuf,
    /// Skip CRC verification.
    #[arg(long)]
    pub no_verify_crc: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn load_config(path: Option<&Path>) -> CliResult<ReceiverConfig> {
    match path {
        Some(path) => ReceiverConfig::load(path).map_err(|err| {
            station_error(&format!("failed loading {}", path.display()), err)
        }),
        None => Ok(ReceiverConfig::default()),
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
}

/// Cancel `cancel` on Ctrl-C.
pub(crate) fn install_ctrlc_handler(cancel: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
