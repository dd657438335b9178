use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::Crc64;
use crate::error::{FrameError, Result};
use crate::wire::{padded_len, put_fixed_str, put_padded, BodyReader, ALIGNMENT};

/// Frame header: type (4) + trailer offset (4) + creator (8) + destination (8)
/// + sequence number (8) + series (4) = 36 bytes.
pub const HEADER_SIZE: usize = 36;

/// Width of the creator and destination identifiers.
pub const ID_LEN: usize = 8;

/// Trailer bytes that do not depend on the authentication value:
/// key id (4) + auth size (4) + comm verification (8).
pub const TRAILER_FIXED_SIZE: usize = 16;

/// Size of the trailing communication verification (CRC-64) field.
pub const COMM_VERIFICATION_SIZE: usize = 8;

/// Frame type discriminator carried in the first header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    ConnectionRequest,
    ConnectionResponse,
    OptionRequest,
    OptionResponse,
    Data,
    Acknack,
    Alert,
    CommandRequest,
    CommandResponse,
    CdOneEncapsulation,
    CustomReset,
    /// Any value this crate does not model. The raw value is kept for re-encoding.
    Unknown(i32),
}

impl FrameType {
    pub fn from_wire(value: i32) -> Self {
        match value {
            1 => FrameType::ConnectionRequest,
            2 => FrameType::ConnectionResponse,
            3 => FrameType::OptionRequest,
            4 => FrameType::OptionResponse,
            5 => FrameType::Data,
            6 => FrameType::Acknack,
            7 => FrameType::Alert,
            8 => FrameType::CommandRequest,
            9 => FrameType::CommandResponse,
            13 => FrameType::CdOneEncapsulation,
            26 => FrameType::CustomReset,
            other => FrameType::Unknown(other),
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            FrameType::ConnectionRequest => 1,
            FrameType::ConnectionResponse => 2,
            FrameType::OptionRequest => 3,
            FrameType::OptionResponse => 4,
            FrameType::Data => 5,
            FrameType::Acknack => 6,
            FrameType::Alert => 7,
            FrameType::CommandRequest => 8,
            FrameType::CommandResponse => 9,
            FrameType::CdOneEncapsulation => 13,
            FrameType::CustomReset => 26,
            FrameType::Unknown(value) => value,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameType::ConnectionRequest => "CONNECTION_REQUEST",
            FrameType::ConnectionResponse => "CONNECTION_RESPONSE",
            FrameType::OptionRequest => "OPTION_REQUEST",
            FrameType::OptionResponse => "OPTION_RESPONSE",
            FrameType::Data => "DATA",
            FrameType::Acknack => "ACKNACK",
            FrameType::Alert => "ALERT",
            FrameType::CommandRequest => "COMMAND_REQUEST",
            FrameType::CommandResponse => "COMMAND_RESPONSE",
            FrameType::CdOneEncapsulation => "CD_ONE_ENCAPSULATION",
            FrameType::CustomReset => "CUSTOM_RESET_FRAME",
            FrameType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Unknown(value) => write!(f, "UNKNOWN({value})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Fixed 36-byte frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    /// Byte offset from frame start to the trailer.
    pub trailer_offset: i32,
    pub creator: String,
    pub destination: String,
    pub sequence_number: u64,
    pub series: i32,
}

impl FrameHeader {
    /// Build a header for a body of `body_len` bytes.
    pub fn new(
        frame_type: FrameType,
        body_len: usize,
        creator: impl Into<String>,
        destination: impl Into<String>,
        sequence_number: u64,
    ) -> Result<Self> {
        Ok(Self {
            frame_type,
            trailer_offset: trailer_offset_for(body_len)?,
            creator: creator.into(),
            destination: destination.into(),
            sequence_number,
            series: 0,
        })
    }

    /// Body length implied by the trailer offset.
    pub fn body_len(&self) -> Result<usize> {
        usize::try_from(self.trailer_offset)
            .ok()
            .and_then(|offset| offset.checked_sub(HEADER_SIZE))
            .ok_or_else(|| {
                FrameError::InvalidHeader(format!(
                    "trailer offset {} is inside the header",
                    self.trailer_offset
                ))
            })
    }

    /// Decode a header from exactly [`HEADER_SIZE`] bytes.
    pub fn decode(src: Bytes) -> Result<Self> {
        if src.len() != HEADER_SIZE {
            return Err(FrameError::InvalidHeader(format!(
                "header must be {HEADER_SIZE} bytes, got {}",
                src.len()
            )));
        }
        let mut reader = BodyReader::new(src);
        let header = Self {
            frame_type: FrameType::from_wire(reader.get_i32("frame type")?),
            trailer_offset: reader.get_i32("trailer offset")?,
            creator: reader.get_string(ID_LEN, "frame creator")?,
            destination: reader.get_string(ID_LEN, "frame destination")?,
            sequence_number: reader.get_u64("sequence number")?,
            series: reader.get_i32("series")?,
        };
        header.body_len()?;
        Ok(header)
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(HEADER_SIZE);
        dst.put_i32(self.frame_type.to_wire());
        dst.put_i32(self.trailer_offset);
        put_fixed_str(dst, &self.creator, ID_LEN, "frame creator")?;
        put_fixed_str(dst, &self.destination, ID_LEN, "frame destination")?;
        dst.put_u64(self.sequence_number);
        dst.put_i32(self.series);
        Ok(())
    }
}

pub(crate) fn trailer_offset_for(body_len: usize) -> Result<i32> {
    i32::try_from(HEADER_SIZE + body_len).map_err(|_| FrameError::FrameTooLarge {
        size: HEADER_SIZE + body_len,
        max: i32::MAX as usize,
    })
}

/// Frame trailer: authentication fields and the CRC-64 communication verification.
///
/// The authentication value is carried opaquely; signatures are never checked here.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameTrailer {
    pub auth_key_id: i32,
    pub auth_value: Bytes,
    pub comm_verification: u64,
}

impl FrameTrailer {
    /// Build a trailer whose CRC covers `header_and_body` plus the trailer itself.
    pub fn sign(auth_key_id: i32, auth_value: Bytes, header_and_body: &[u8]) -> Self {
        let comm_verification = compute_crc(header_and_body, auth_key_id, &auth_value);
        Self {
            auth_key_id,
            auth_value,
            comm_verification,
        }
    }

    /// Whether the stored CRC matches `header_and_body` and this trailer.
    pub fn verify(&self, header_and_body: &[u8]) -> bool {
        compute_crc(header_and_body, self.auth_key_id, &self.auth_value) == self.comm_verification
    }

    /// Bytes this trailer occupies on the wire.
    pub fn wire_size(&self) -> usize {
        TRAILER_FIXED_SIZE + padded_len(self.auth_value.len(), ALIGNMENT)
    }

    pub fn decode(src: Bytes) -> Result<Self> {
        let mut reader = BodyReader::new(src);
        let auth_key_id = reader.get_i32("authentication key id")?;
        let auth_size = reader.get_len("authentication size")?;
        let auth_value = reader.get_padded_bytes(auth_size, "authentication value")?;
        let comm_verification = reader.get_u64("comm verification")?;
        reader.finish()?;
        Ok(Self {
            auth_key_id,
            auth_value,
            comm_verification,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(self.wire_size());
        encode_auth(dst, self.auth_key_id, &self.auth_value)?;
        dst.put_u64(self.comm_verification);
        Ok(())
    }
}

impl fmt::Debug for FrameTrailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTrailer")
            .field("auth_key_id", &self.auth_key_id)
            .field(
                "auth_value",
                &format_args!("<{} bytes>", self.auth_value.len()),
            )
            .field(
                "comm_verification",
                &format_args!("{:#018x}", self.comm_verification),
            )
            .finish()
    }
}

fn encode_auth(dst: &mut BytesMut, auth_key_id: i32, auth_value: &[u8]) -> Result<()> {
    dst.put_i32(auth_key_id);
    crate::wire::put_len(dst, auth_value.len(), "authentication size")?;
    put_padded(dst, auth_value);
    Ok(())
}

fn compute_crc(header_and_body: &[u8], auth_key_id: i32, auth_value: &[u8]) -> u64 {
    let mut crc = Crc64::new();
    crc.update(header_and_body);
    let mut tail = BytesMut::with_capacity(TRAILER_FIXED_SIZE + auth_value.len() + ALIGNMENT);
    // Lengths past i32::MAX never reach the wire; the encoder rejects them.
    tail.put_i32(auth_key_id);
    tail.put_i32(auth_value.len() as i32);
    put_padded(&mut tail, auth_value);
    tail.put_bytes(0, COMM_VERIFICATION_SIZE);
    crc.update(&tail);
    crc.finish()
}
