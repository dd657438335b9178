//! Data frame payload: a channel subframe header followed by one subframe per channel.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};

use crate::error::{FrameError, Result};
use crate::status::ChannelStatus;
use crate::wire::{
    padded_len, padding_len, put_fixed_str, put_len, put_padded, put_timestamp, BodyReader,
    ALIGNMENT,
};

/// Characters per channel in the header's channel string: site (5) + channel (3) + location (2).
pub const CHANNEL_DESCRIPTOR_LEN: usize = 10;

/// Fixed bytes in a subframe ahead of the variable status block:
/// channel length (4) + auth offset (4) + description (24) + timestamp (20)
/// + time length (4) + samples (4) + status size (4).
const SUBFRAME_FIXED_PREFIX: usize = 64;

/// Describes the channels carried by a data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubframeHeader {
    pub num_channels: u32,
    /// Frame duration in milliseconds.
    pub frame_time_length: u32,
    pub nominal_time: DateTime<Utc>,
    /// Concatenated 10-character channel descriptors.
    pub channel_string: String,
}

impl ChannelSubframeHeader {
    pub fn decode(r: &mut BodyReader) -> Result<Self> {
        let num_channels = positive(r.get_i32("number of channels")?, "number of channels")?;
        let frame_time_length = positive(r.get_i32("frame time length")?, "frame time length")?;
        let nominal_time = r.get_timestamp("nominal time")?;
        let count = r.get_len("channel string count")?;
        let raw = r.take(count, "channel string")?;
        let channel_string = String::from_utf8(raw.to_vec())
            .map_err(|e| FrameError::malformed("channel string", e.to_string()))?;

        let needed = num_channels as usize * CHANNEL_DESCRIPTOR_LEN;
        if count < needed {
            return Err(FrameError::malformed(
                "channel string",
                format!("{num_channels} channels need {needed} bytes, got {count}"),
            ));
        }

        // Some stations skip the alignment padding after an odd channel count.
        // Padding is present only if the padding bytes plus the high half of
        // the next channel length read as zero.
        let padding = padding_len(count, ALIGNMENT);
        if padding > 0 {
            if r.peek_i32() == Some(0) {
                r.skip(padding, "channel string padding")?;
            } else {
                tracing::debug!(count, "channel string did not end on a 4 byte boundary");
            }
        }

        Ok(Self {
            num_channels,
            frame_time_length,
            nominal_time,
            channel_string,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_len(dst, self.num_channels as usize, "number of channels")?;
        put_len(dst, self.frame_time_length as usize, "frame time length")?;
        put_timestamp(dst, &self.nominal_time, "nominal time")?;
        put_len(dst, self.channel_string.len(), "channel string count")?;
        put_padded(dst, self.channel_string.as_bytes());
        Ok(())
    }

    /// Number of subframes implied by the channel string.
    pub fn subframe_count(&self) -> usize {
        self.channel_string.len() / CHANNEL_DESCRIPTOR_LEN
    }

    /// The 10-character descriptor for each channel.
    pub fn channel_descriptors(&self) -> impl Iterator<Item = &str> + '_ {
        let bytes = self.channel_string.as_bytes();
        (0..self.subframe_count()).filter_map(move |i| {
            let start = i * CHANNEL_DESCRIPTOR_LEN;
            std::str::from_utf8(&bytes[start..start + CHANNEL_DESCRIPTOR_LEN]).ok()
        })
    }
}

fn positive(value: i32, field: &'static str) -> Result<u32> {
    if value <= 0 {
        return Err(FrameError::malformed(
            field,
            format!("must be > 0, got {value}"),
        ));
    }
    Ok(value as u32)
}

fn non_negative(value: i32, field: &'static str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| FrameError::malformed(field, format!("must be >= 0, got {value}")))
}

/// One channel's slice of a data frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSubframe {
    pub auth_offset: i32,
    pub authenticated: bool,
    /// Compression (transformation) code; 0 is uncompressed.
    pub compression: u8,
    pub sensor_type: u8,
    /// Set while the channel is being calibrated.
    pub calibration: bool,
    pub site: String,
    pub channel: String,
    pub location: String,
    /// Uncompressed sample format, e.g. `s4`.
    pub data_type: String,
    pub calibration_factor: f32,
    pub calibration_period: f32,
    pub timestamp: DateTime<Utc>,
    /// Subframe duration in milliseconds.
    pub time_length: u32,
    pub samples: u32,
    pub status: ChannelStatus,
    /// Waveform payload, opaque to this crate.
    pub data: Bytes,
    pub subframe_count: u32,
    pub auth_key_id: i32,
    pub auth_value: Bytes,
}

impl ChannelSubframe {
    /// Unauthenticated, uncompressed subframe with a blank status block.
    pub fn new(
        site: impl Into<String>,
        channel: impl Into<String>,
        location: impl Into<String>,
        timestamp: DateTime<Utc>,
        time_length: u32,
        samples: u32,
        data: impl Into<Bytes>,
    ) -> Self {
        let mut subframe = Self {
            auth_offset: 0,
            authenticated: false,
            compression: 0,
            sensor_type: 0,
            calibration: false,
            site: site.into(),
            channel: channel.into(),
            location: location.into(),
            data_type: "s4".into(),
            calibration_factor: 1.0,
            calibration_period: 1.0,
            timestamp,
            time_length,
            samples,
            status: ChannelStatus::blank(),
            data: data.into(),
            subframe_count: 0,
            auth_key_id: 0,
            auth_value: Bytes::new(),
        };
        subframe.auth_offset = subframe.computed_auth_offset() as i32;
        subframe
    }

    pub fn decode(r: &mut BodyReader) -> Result<Self> {
        let channel_length = r.get_len("channel length")?;
        let mut sub = BodyReader::new(r.take(channel_length, "channel subframe")?);

        let auth_offset = sub.get_i32("authentication offset")?;
        let authenticated = sub.get_u8("authentication flag")? == 1;
        let compression = sub.get_u8("compression")?;
        let sensor_type = sub.get_u8("sensor type")?;
        let calibration = sub.get_u8("calibration flag")? == 1;
        let site = sub.get_string(5, "site name")?;
        let channel = sub.get_string(3, "channel name")?;
        let location = sub.get_string(2, "location name")?;
        let data_type = sub.get_string(2, "data type")?;
        let calibration_factor = sub.get_f32("calibration factor")?;
        let calibration_period = sub.get_f32("calibration period")?;
        let timestamp = sub.get_timestamp("subframe timestamp")?;
        let time_length = non_negative(sub.get_i32("subframe time length")?, "subframe time length")?;
        let samples = non_negative(sub.get_i32("samples")?, "samples")?;
        let status_size = sub.get_len("channel status size")?;
        let status = ChannelStatus::new(sub.get_padded_bytes(status_size, "channel status")?);
        let data_size = sub.get_len("data size")?;
        let data = sub.get_padded_bytes(data_size, "channel data")?;
        let subframe_count = non_negative(sub.get_i32("subframe count")?, "subframe count")?;
        let auth_key_id = sub.get_i32("subframe authentication key id")?;
        let auth_size = sub.get_len("subframe authentication size")?;
        let auth_value = sub.get_padded_bytes(auth_size, "subframe authentication value")?;
        sub.finish()?;

        Ok(Self {
            auth_offset,
            authenticated,
            compression,
            sensor_type,
            calibration,
            site,
            channel,
            location,
            data_type,
            calibration_factor,
            calibration_period,
            timestamp,
            time_length,
            samples,
            status,
            data,
            subframe_count,
            auth_key_id,
            auth_value,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut sub = BytesMut::with_capacity(self.wire_size());
        sub.put_i32(self.auth_offset);
        sub.put_u8(u8::from(self.authenticated));
        sub.put_u8(self.compression);
        sub.put_u8(self.sensor_type);
        sub.put_u8(u8::from(self.calibration));
        put_fixed_str(&mut sub, &self.site, 5, "site name")?;
        put_fixed_str(&mut sub, &self.channel, 3, "channel name")?;
        put_fixed_str(&mut sub, &self.location, 2, "location name")?;
        put_fixed_str(&mut sub, &self.data_type, 2, "data type")?;
        sub.put_f32(self.calibration_factor);
        sub.put_f32(self.calibration_period);
        put_timestamp(&mut sub, &self.timestamp, "subframe timestamp")?;
        put_len(&mut sub, self.time_length as usize, "subframe time length")?;
        put_len(&mut sub, self.samples as usize, "samples")?;
        put_len(&mut sub, self.status.len(), "channel status size")?;
        put_padded(&mut sub, self.status.as_bytes());
        put_len(&mut sub, self.data.len(), "data size")?;
        put_padded(&mut sub, &self.data);
        put_len(&mut sub, self.subframe_count as usize, "subframe count")?;
        sub.put_i32(self.auth_key_id);
        put_len(&mut sub, self.auth_value.len(), "subframe authentication size")?;
        put_padded(&mut sub, &self.auth_value);

        put_len(dst, sub.len(), "channel length")?;
        dst.put_slice(&sub);
        Ok(())
    }

    /// Bytes this subframe occupies on the wire, including its length prefix.
    pub fn wire_size(&self) -> usize {
        self.computed_auth_offset() + 8 + padded_len(self.auth_value.len(), ALIGNMENT)
    }

    /// Offset of the authentication key id from the start of the subframe.
    pub fn computed_auth_offset(&self) -> usize {
        SUBFRAME_FIXED_PREFIX
            + padded_len(self.status.len(), ALIGNMENT)
            + 4
            + padded_len(self.data.len(), ALIGNMENT)
            + 4
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.timestamp + Duration::milliseconds(i64::from(self.time_length))
    }

    /// Samples per second, if the subframe has a non-zero duration.
    pub fn sample_rate(&self) -> Option<f64> {
        if self.time_length == 0 {
            return None;
        }
        Some(f64::from(self.samples) / (f64::from(self.time_length) / 1000.0))
    }

    /// `site.channel.location` identifier.
    pub fn channel_id(&self) -> String {
        format!("{}.{}.{}", self.site, self.channel, self.location)
    }

    /// The 10-character descriptor used in the subframe header's channel string.
    pub fn descriptor(&self) -> Result<String> {
        let mut buf = BytesMut::with_capacity(CHANNEL_DESCRIPTOR_LEN);
        put_fixed_str(&mut buf, &self.site, 5, "site name")?;
        put_fixed_str(&mut buf, &self.channel, 3, "channel name")?;
        put_fixed_str(&mut buf, &self.location, 2, "location name")?;
        String::from_utf8(buf.to_vec())
            .map_err(|e| FrameError::malformed("channel descriptor", e.to_string()))
    }
}

/// Decoded data frame body.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    pub header: ChannelSubframeHeader,
    pub subframes: Vec<ChannelSubframe>,
}

impl DataFrame {
    /// Build a data frame whose header describes `subframes`.
    ///
    /// The nominal time is the earliest subframe timestamp and the frame time
    /// length is taken from the first subframe.
    pub fn from_subframes(subframes: Vec<ChannelSubframe>) -> Result<Self> {
        let first = subframes
            .first()
            .ok_or_else(|| FrameError::malformed("channel subframes", "at least one required"))?;
        let frame_time_length = positive(
            i32::try_from(first.time_length).unwrap_or(i32::MAX),
            "frame time length",
        )?;
        let nominal_time = subframes
            .iter()
            .map(|s| s.timestamp)
            .min()
            .unwrap_or(first.timestamp);
        let channel_string = subframes
            .iter()
            .map(ChannelSubframe::descriptor)
            .collect::<Result<String>>()?;
        let num_channels = u32::try_from(subframes.len())
            .map_err(|_| FrameError::malformed("number of channels", "too many subframes"))?;

        Ok(Self {
            header: ChannelSubframeHeader {
                num_channels,
                frame_time_length,
                nominal_time,
                channel_string,
            },
            subframes,
        })
    }

    pub fn decode(body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let header = ChannelSubframeHeader::decode(&mut r)?;
        let count = header.subframe_count();
        if count != header.num_channels as usize {
            tracing::debug!(
                num_channels = header.num_channels,
                descriptors = count,
                "channel string length disagrees with channel count"
            );
        }

        let mut subframes = Vec::with_capacity(count);
        for _ in 0..count {
            subframes.push(ChannelSubframe::decode(&mut r)?);
        }
        r.finish()?;
        Ok(Self { header, subframes })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode(dst)?;
        for subframe in &self.subframes {
            subframe.encode(dst)?;
        }
        Ok(())
    }

    /// Payload end: nominal time plus frame time length.
    pub fn nominal_end_time(&self) -> DateTime<Utc> {
        self.header.nominal_time + Duration::milliseconds(i64::from(self.header.frame_time_length))
    }
}
