use cd11_station::ConnectionBroker;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, load_config, runtime, ConnmanArgs};
use crate::exit::{io_error, station_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

pub fn run(args: ConnmanArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.broker.well_known_port = port;
    }
    if let Some(bind) = args.bind {
        config.broker.listen_address = bind;
    }

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let broker = ConnectionBroker::new(&config);
    runtime()?.block_on(async {
        let listener = broker
            .bind()
            .await
            .map_err(|err| station_error("bind failed", err))?;
        let local = listener
            .local_addr()
            .map_err(|err| io_error("bind failed", err))?;
        info!(
            addr = %local,
            routes = broker.routes().len(),
            "connection broker listening"
        );
        broker
            .run(listener, cancel)
            .await
            .map_err(|err| station_error("broker failed", err))
    })?;

    let stats = broker.connection_log().stats();
    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Table => print_table(
            &["TOTAL", "VALID", "INVALID"],
            vec![vec![
                stats.total.to_string(),
                stats.valid.to_string(),
                stats.invalid.to_string(),
            ]],
        ),
        OutputFormat::Pretty => println!(
            "connections total={} valid={} invalid={}",
            stats.total, stats.valid, stats.invalid
        ),
    }

    Ok(SUCCESS)
}
