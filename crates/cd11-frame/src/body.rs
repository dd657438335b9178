//! Bodies of the control frames: connection, option, acknack, alert and command.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{FrameError, Result};
use crate::wire::{put_fixed_str, put_len, put_padded, put_timestamp, BodyReader};

/// Connection request and response bodies are always 32 bytes.
pub const CONNECTION_BODY_SIZE: usize = 32;

/// Width of the Acknack "frame set acked" label.
pub const FRAMESET_ACKED_LEN: usize = 20;

/// Longest option value accepted in an option request or response.
pub const MAX_OPTION_VALUE_LEN: usize = 8;

/// Body shared by connection requests and connection responses.
///
/// In a request the name and types describe the station; in a response they
/// describe the responder, and the address is where the station should reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBody {
    pub major_version: i16,
    pub minor_version: i16,
    pub name: String,
    pub node_type: String,
    pub service_type: String,
    pub ip_address: Ipv4Addr,
    pub port: u16,
    pub second_ip_address: Option<Ipv4Addr>,
    pub second_port: Option<u16>,
}

impl ConnectionBody {
    pub fn decode(body: Bytes) -> Result<Self> {
        if body.len() != CONNECTION_BODY_SIZE {
            return Err(FrameError::TrailerOffsetMismatch {
                declared: body.len() as i64,
                actual: CONNECTION_BODY_SIZE as i64,
            });
        }
        let mut r = BodyReader::new(body);
        let major_version = r.get_i16("major version")?;
        let minor_version = r.get_i16("minor version")?;
        validate_version(major_version, minor_version)?;
        let name = r.get_string(8, "station name")?;
        let node_type = r.get_string(4, "station type")?;
        let service_type = r.get_string(4, "service type")?;
        validate_service_type(&service_type)?;
        let ip_address = Ipv4Addr::from(r.get_u32("ip address")?);
        let port = r.get_u16("port")?;
        let second_ip = r.get_u32("second ip address")?;
        let second_port = r.get_u16("second port")?;
        r.finish()?;

        Ok(Self {
            major_version,
            minor_version,
            name,
            node_type,
            service_type,
            ip_address,
            port,
            second_ip_address: (second_ip != 0).then(|| Ipv4Addr::from(second_ip)),
            second_port: (second_port != 0).then_some(second_port),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        validate_version(self.major_version, self.minor_version)?;
        validate_service_type(&self.service_type)?;
        dst.reserve(CONNECTION_BODY_SIZE);
        dst.put_i16(self.major_version);
        dst.put_i16(self.minor_version);
        put_fixed_str(dst, &self.name, 8, "station name")?;
        put_fixed_str(dst, &self.node_type, 4, "station type")?;
        put_fixed_str(dst, &self.service_type, 4, "service type")?;
        dst.put_u32(u32::from(self.ip_address));
        dst.put_u16(self.port);
        dst.put_u32(self.second_ip_address.map(u32::from).unwrap_or(0));
        dst.put_u16(self.second_port.unwrap_or(0));
        Ok(())
    }
}

fn validate_version(major: i16, minor: i16) -> Result<()> {
    if major < 0 || minor < 0 {
        return Err(FrameError::malformed(
            "protocol version",
            format!("negative version {major}.{minor}"),
        ));
    }
    Ok(())
}

fn validate_service_type(service_type: &str) -> Result<()> {
    match service_type {
        "TCP" | "UDP" => Ok(()),
        other => Err(FrameError::malformed(
            "service type",
            format!("expected TCP or UDP, got '{other}'"),
        )),
    }
}

/// Option request or response. Only a single option per frame is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionBody {
    pub option_type: i32,
    pub option_value: String,
}

impl OptionBody {
    pub fn decode(body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let count = r.get_i32("option count")?;
        if count != 1 {
            return Err(FrameError::malformed(
                "option count",
                format!("exactly one option supported, got {count}"),
            ));
        }
        let option_type = r.get_i32("option type")?;
        let size = r.get_len("option size")?;
        let option_value = r.get_padded_string(size, "option value")?;
        r.finish()?;
        validate_option_value(&option_value)?;
        Ok(Self {
            option_type,
            option_value,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        validate_option_value(&self.option_value)?;
        dst.put_i32(1);
        dst.put_i32(self.option_type);
        put_len(dst, self.option_value.len(), "option size")?;
        put_padded(dst, self.option_value.as_bytes());
        Ok(())
    }
}

fn validate_option_value(value: &str) -> Result<()> {
    if value.is_empty() || value.len() > MAX_OPTION_VALUE_LEN {
        return Err(FrameError::malformed(
            "option value",
            format!(
                "length must be 1-{MAX_OPTION_VALUE_LEN} characters, got {}",
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Inclusive range of sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct SequenceRange {
    pub start: u64,
    pub end: u64,
}

impl SequenceRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn single(value: u64) -> Self {
        Self::new(value, value)
    }

    pub fn contains(&self, value: u64) -> bool {
        self.start <= value && value <= self.end
    }

    /// Number of sequence numbers covered.
    pub fn count(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Acknowledgement summary: the sequence window seen and the gaps inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknack {
    /// `creator:destination` of the acknowledged frame set.
    pub frameset_acked: String,
    pub lowest_seq: u64,
    pub highest_seq: u64,
    pub gaps: Vec<SequenceRange>,
}

impl Acknack {
    pub fn decode(body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let frameset_acked = r.get_string(FRAMESET_ACKED_LEN, "frame set acked")?;
        let lowest_seq = r.get_u64("lowest sequence number")?;
        let highest_seq = r.get_u64("highest sequence number")?;
        let gap_count = r.get_len("gap count")?;
        if gap_count.saturating_mul(16) > r.remaining() {
            return Err(FrameError::malformed(
                "gap count",
                format!("{gap_count} gaps do not fit in {} bytes", r.remaining()),
            ));
        }
        let mut gaps = Vec::with_capacity(gap_count);
        for _ in 0..gap_count {
            let start = r.get_u64("gap start")?;
            let end = r.get_u64("gap end")?;
            let gap = SequenceRange { start, end };
            validate_gap(&gap)?;
            gaps.push(gap);
        }
        r.finish()?;
        Ok(Self {
            frameset_acked,
            lowest_seq,
            highest_seq,
            gaps,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        self.gaps.iter().try_for_each(validate_gap)?;
        dst.reserve(FRAMESET_ACKED_LEN + 20 + self.gaps.len() * 16);
        put_fixed_str(dst, &self.frameset_acked, FRAMESET_ACKED_LEN, "frame set acked")?;
        dst.put_u64(self.lowest_seq);
        dst.put_u64(self.highest_seq);
        put_len(dst, self.gaps.len(), "gap count")?;
        for gap in &self.gaps {
            dst.put_u64(gap.start);
            dst.put_u64(gap.end);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
}

impl Alert {
    pub fn decode(body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let size = r.get_len("alert size")?;
        let message = r.get_padded_string(size, "alert message")?;
        r.finish()?;
        validate_alert_message(&message)?;
        Ok(Self { message })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        validate_alert_message(&self.message)?;
        put_len(dst, self.message.len(), "alert size")?;
        put_padded(dst, self.message.as_bytes());
        Ok(())
    }
}

fn validate_alert_message(message: &str) -> Result<()> {
    if message.is_empty() {
        return Err(FrameError::malformed("alert message", "empty"));
    }
    Ok(())
}

/// Channel addressed by a command: `station` plus the `site/channel/location` triple.
fn validate_gap(gap: &SequenceRange) -> Result<()> {
    if gap.end < gap.start {
        return Err(FrameError::malformed(
            "gap range",
            format!("end {} precedes start {}", gap.end, gap.start),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTarget {
    pub station: String,
    pub site: String,
    pub channel: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

impl CommandTarget {
    fn decode(r: &mut BodyReader) -> Result<Self> {
        let station = r.get_string(8, "command station")?;
        let site = r.get_string(5, "command site")?;
        let channel = r.get_string(3, "command channel")?;
        let location = r.get_string(2, "command location")?;
        r.skip(2, "command padding")?;
        let timestamp = r.get_timestamp("command timestamp")?;
        Ok(Self {
            station,
            site,
            channel,
            location,
            timestamp,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_fixed_str(dst, &self.station, 8, "command station")?;
        put_fixed_str(dst, &self.site, 5, "command site")?;
        put_fixed_str(dst, &self.channel, 3, "command channel")?;
        put_fixed_str(dst, &self.location, 2, "command location")?;
        dst.put_bytes(0, 2);
        put_timestamp(dst, &self.timestamp, "command timestamp")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub target: CommandTarget,
    pub command_message: String,
}

impl CommandRequest {
    pub fn decode(body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let target = CommandTarget::decode(&mut r)?;
        let size = r.get_len("command size")?;
        let command_message = r.get_padded_string(size, "command message")?;
        r.finish()?;
        Ok(Self {
            target,
            command_message,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        self.target.encode(dst)?;
        put_len(dst, self.command_message.len(), "command size")?;
        put_padded(dst, self.command_message.as_bytes());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub target: CommandTarget,
    pub command_request_message: String,
    pub response_message: String,
}

impl CommandResponse {
    pub fn decode(body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let target = CommandTarget::decode(&mut r)?;
        let size = r.get_len("command size")?;
        let command_request_message = r.get_padded_string(size, "command message")?;
        let size = r.get_len("response size")?;
        let response_message = r.get_padded_string(size, "response message")?;
        r.finish()?;
        Ok(Self {
            target,
            command_request_message,
            response_message,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        self.target.encode(dst)?;
        put_len(dst, self.command_request_message.len(), "command size")?;
        put_padded(dst, self.command_request_message.as_bytes());
        put_len(dst, self.response_message.len(), "response size")?;
        put_padded(dst, self.response_message.as_bytes());
        Ok(())
    }
}
