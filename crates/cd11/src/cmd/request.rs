use cd11_frame::{ConnectionBody, FrameFactory};
use cd11_station::connect_to_broker;
use serde::Serialize;

use crate::cmd::{parse_duration, RequestArgs};
use crate::exit::{station_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct ResponseOutput<'a> {
    station: &'a str,
    protocol_version: String,
    responder_name: &'a str,
    responder_type: &'a str,
    service_type: &'a str,
    data_address: String,
    second_address: Option<String>,
}

impl<'a> ResponseOutput<'a> {
    fn new(station: &'a str, response: &'a ConnectionBody) -> Self {
        let second_address = match (response.second_ip_address, response.second_port) {
            (Some(ip), Some(port)) => Some(format!("{ip}:{port}")),
            _ => None,
        };
        Self {
            station,
            protocol_version: format!("{}.{}", response.major_version, response.minor_version),
            responder_name: &response.name,
            responder_type: &response.node_type,
            service_type: &response.service_type,
            data_address: format!("{}:{}", response.ip_address, response.port),
            second_address,
        }
    }
}

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let factory = FrameFactory::new().with_frame_creator(args.station.as_str());
    let response =
        connect_to_broker(args.addr, &factory, &args.station, &args.station_type, timeout)
            .map_err(|err| station_error("connection request failed", err))?;

    let out = ResponseOutput::new(&args.station, &response);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            &["STATION", "RESPONDER", "TYPE", "SERVICE", "DATA ADDRESS"],
            vec![vec![
                out.station.to_string(),
                out.responder_name.to_string(),
                out.responder_type.to_string(),
                out.service_type.to_string(),
                out.data_address.clone(),
            ]],
        ),
        OutputFormat::Pretty => println!(
            "station={} responder={} type={} service={} data={} version={}",
            out.station,
            out.responder_name,
            out.responder_type,
            out.service_type,
            out.data_address,
            out.protocol_version
        ),
    }

    Ok(SUCCESS)
}
