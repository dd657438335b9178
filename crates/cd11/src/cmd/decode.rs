use std::fs::File;
use std::io::BufReader;

use cd11_frame::{Cd11Frame, FrameBody, FrameError, FrameReader, RawFrame};
use serde::Serialize;
use tracing::warn;

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{crc_label, print_json, print_table, OutputFormat};

#[derive(Debug, Serialize)]
struct FrameSummary {
    index: usize,
    frame_type: String,
    sequence_number: u64,
    creator: String,
    destination: String,
    size: usize,
    crc_valid: Option<bool>,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FrameSummary {
    fn new(index: usize, raw: &RawFrame, verify_crc: bool) -> Self {
        let (detail, error) = match Cd11Frame::decode(raw) {
            Ok(frame) => (describe(&frame.body), None),
            Err(err) => (String::new(), Some(err.to_string())),
        };
        Self {
            index,
            frame_type: raw.frame_type().to_string(),
            sequence_number: raw.header.sequence_number,
            creator: raw.header.creator.clone(),
            destination: raw.header.destination.clone(),
            size: raw.wire_size(),
            crc_valid: verify_crc.then(|| raw.verify_crc()),
            detail,
            error,
        }
    }

    fn is_valid(&self) -> bool {
        self.error.is_none() && self.crc_valid != Some(false)
    }
}

fn describe(body: &FrameBody) -> String {
    match body {
        FrameBody::ConnectionRequest(conn) | FrameBody::ConnectionResponse(conn) => format!(
            "name={} type={} service={} addr={}:{}",
            conn.name, conn.node_type, conn.service_type, conn.ip_address, conn.port
        ),
        FrameBody::OptionRequest(option) | FrameBody::OptionResponse(option) => {
            format!("option={} value={}", option.option_type, option.option_value)
        }
        FrameBody::Acknack(ack) => format!(
            "frameset={} lowest={} highest={} gaps={}",
            ack.frameset_acked,
            ack.lowest_seq,
            ack.highest_seq,
            ack.gaps.len()
        ),
        FrameBody::Alert(alert) => format!("message={}", alert.message),
        FrameBody::CommandRequest(cmd) => {
            format!("station={} command={}", cmd.target.station, cmd.command_message)
        }
        FrameBody::CommandResponse(cmd) => format!(
            "station={} command={} response={}",
            cmd.target.station, cmd.command_request_message, cmd.response_message
        ),
        FrameBody::Data(data) => format!(
            "channels={} nominal={} length_ms={}",
            data.subframes
                .iter()
                .map(|s| s.channel_id())
                .collect::<Vec<_>>()
                .join(","),
            data.header.nominal_time.to_rfc3339(),
            data.header.frame_time_length
        ),
        FrameBody::CustomReset(body) | FrameBody::Unsupported { body, .. } => {
            format!("body_bytes={}", body.len())
        }
    }
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let file = File::open(&args.path)
        .map_err(|err| io_error(&format!("failed opening {}", args.path.display()), err))?;
    let mut reader = FrameReader::new(BufReader::new(file));
    let verify_crc = !args.no_verify_crc;

    let mut summaries = Vec::new();
    let mut stream_error = None;
    loop {
        match reader.read_frame() {
            Ok(raw) => {
                let summary = FrameSummary::new(summaries.len(), &raw, verify_crc);
                if let Some(err) = &summary.error {
                    warn!(index = summary.index, error = %err, "frame failed to decode");
                }
                if let OutputFormat::Json = format {
                    print_json(&summary);
                }
                summaries.push(summary);
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => {
                stream_error = Some(err);
                break;
            }
        }
    }

    match format {
        OutputFormat::Json => {}
        OutputFormat::Table => print_table(
            &["#", "TYPE", "SEQ", "CREATOR", "SIZE", "CRC", "DETAIL"],
            summaries
                .iter()
                .map(|s| {
                    vec![
                        s.index.to_string(),
                        s.frame_type.clone(),
                        s.sequence_number.to_string(),
                        s.creator.clone(),
                        s.size.to_string(),
                        crc_label(s.crc_valid).to_string(),
                        s.error.clone().unwrap_or_else(|| s.detail.clone()),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            for s in &summaries {
                println!(
                    "#{} {} seq={} creator={} size={} crc={} {}",
                    s.index,
                    s.frame_type,
                    s.sequence_number,
                    s.creator,
                    s.size,
                    crc_label(s.crc_valid),
                    s.error.as_deref().unwrap_or(&s.detail)
                );
            }
        }
    }

    if let Some(err) = stream_error {
        let context = format!("stream unreadable after {} frames", summaries.len());
        return Err(match err {
            FrameError::Io(source) => io_error(&context, source),
            other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
        });
    }
    if summaries.iter().all(FrameSummary::is_valid) {
        Ok(SUCCESS)
    } else {
        Ok(DATA_INVALID)
    }
}
