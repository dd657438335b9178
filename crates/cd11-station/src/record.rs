use bytes::Bytes;
use cd11_frame::{DataFrame, RawFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authentication state of a received payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationStatus {
    NotApplicable,
    NotYetAuthenticated,
    AuthenticationFailed,
    AuthenticationSucceeded,
}

/// Time span covered by one channel subframe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformSummary {
    pub channel_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A decoded data frame handed to the downstream consumer.
///
/// Waveform samples stay compressed inside `raw_payload`, which holds the
/// frame exactly as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStationRecord {
    pub id: Uuid,
    pub station_name: String,
    pub sequence_number: u64,
    pub channel_names: Vec<String>,
    pub waveform_summaries: Vec<WaveformSummary>,
    pub payload_start_time: DateTime<Utc>,
    pub payload_end_time: DateTime<Utc>,
    pub authentication_status: AuthenticationStatus,
    /// `None` when CRC checking is disabled.
    pub crc_valid: Option<bool>,
    pub reception_time: DateTime<Utc>,
    pub raw_payload: Bytes,
}

impl RawStationRecord {
    pub fn from_data_frame(
        station_name: &str,
        raw: &RawFrame,
        data: &DataFrame,
        reception_time: DateTime<Utc>,
        crc_valid: Option<bool>,
    ) -> Self {
        let waveform_summaries: Vec<WaveformSummary> = data
            .subframes
            .iter()
            .map(|s| WaveformSummary {
                channel_name: s.channel_id(),
                start_time: s.timestamp,
                end_time: s.end_time(),
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            station_name: station_name.to_string(),
            sequence_number: raw.header.sequence_number,
            channel_names: waveform_summaries
                .iter()
                .map(|w| w.channel_name.clone())
                .collect(),
            waveform_summaries,
            payload_start_time: data.header.nominal_time,
            payload_end_time: data.nominal_end_time(),
            authentication_status: AuthenticationStatus::NotYetAuthenticated,
            crc_valid,
            reception_time,
            raw_payload: raw.bytes.clone(),
        }
    }
}
