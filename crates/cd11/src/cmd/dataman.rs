use cd11_station::serve_stations;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, load_config, runtime, DatamanArgs};
use crate::exit::{station_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_record, OutputFormat};

pub fn run(args: DatamanArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = load_config(Some(args.config.as_path()))?;
    if let Some(bind) = args.bind {
        config.receiver.listen_address = bind;
    }
    let acquired = config.stations.iter().filter(|s| s.acquired).count();
    if acquired == 0 {
        return Err(CliError::new(USAGE, "configuration has no acquired stations"));
    }

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    runtime()?.block_on(async move {
        let (tx, mut rx) = mpsc::channel(config.receiver.sink_capacity);
        let server = {
            let cancel = cancel.clone();
            tokio::spawn(async move { serve_stations(&config, tx, cancel).await })
        };
        info!(stations = acquired, "data receivers starting");

        let mut printed = 0usize;
        while let Some(record) = rx.recv().await {
            print_record(&record, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                cancel.cancel();
                break;
            }
        }
        drop(rx);

        match server.await {
            Ok(result) => result.map_err(|err| station_error("data receivers failed", err)),
            Err(err) => Err(CliError::new(
                INTERNAL,
                format!("data receiver task failed: {err}"),
            )),
        }
    })?;

    Ok(SUCCESS)
}
