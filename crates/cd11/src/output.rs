use std::io::IsTerminal;

use cd11_station::{AuthenticationStatus, RawStationRecord};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One JSON document per line.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

#[derive(Serialize)]
struct RecordOutput<'a> {
    id: String,
    station: &'a str,
    sequence_number: u64,
    channels: &'a [String],
    payload_start_time: String,
    payload_end_time: String,
    authentication_status: AuthenticationStatus,
    crc_valid: Option<bool>,
    reception_time: String,
    payload_size: usize,
}

impl<'a> From<&'a RawStationRecord> for RecordOutput<'a> {
    fn from(record: &'a RawStationRecord) -> Self {
        Self {
            id: record.id.to_string(),
            station: &record.station_name,
            sequence_number: record.sequence_number,
            channels: &record.channel_names,
            payload_start_time: record.payload_start_time.to_rfc3339(),
            payload_end_time: record.payload_end_time.to_rfc3339(),
            authentication_status: record.authentication_status,
            crc_valid: record.crc_valid,
            reception_time: record.reception_time.to_rfc3339(),
            payload_size: record.raw_payload.len(),
        }
    }
}

pub fn print_record(record: &RawStationRecord, format: OutputFormat) {
    let out = RecordOutput::from(record);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            &["STATION", "SEQ", "CHANNELS", "START", "END", "CRC", "SIZE"],
            vec![vec![
                out.station.to_string(),
                out.sequence_number.to_string(),
                out.channels.join(","),
                out.payload_start_time,
                out.payload_end_time,
                crc_label(out.crc_valid).to_string(),
                out.payload_size.to_string(),
            ]],
        ),
        OutputFormat::Pretty => {
            println!(
                "station={} seq={} channels={} start={} end={} crc={} size={}",
                out.station,
                out.sequence_number,
                out.channels.join(","),
                out.payload_start_time,
                out.payload_end_time,
                crc_label(out.crc_valid),
                out.payload_size
            );
        }
    }
}

pub fn crc_label(crc_valid: Option<bool>) -> &'static str {
    match crc_valid {
        Some(true) => "ok",
        Some(false) => "mismatch",
        None => "unchecked",
    }
}
