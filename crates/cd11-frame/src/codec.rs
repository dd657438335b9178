use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{FrameHeader, FrameTrailer, FrameType, HEADER_SIZE, TRAILER_FIXED_SIZE};
use crate::wire::{padded_len, ALIGNMENT};

/// Default maximum frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One delimited frame: parsed header and trailer, opaque body, and the exact wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub header: FrameHeader,
    pub body: Bytes,
    pub trailer: FrameTrailer,
    /// The complete frame as received, header through CRC.
    pub bytes: Bytes,
}

impl RawFrame {
    /// Split a buffer holding exactly one frame.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let mut buf = BytesMut::from(bytes.as_ref());
        let total = buf.len();
        match decode_raw_frame(&mut buf, usize::MAX)? {
            Some(frame) if buf.is_empty() => Ok(frame),
            Some(frame) => Err(FrameError::TrailerOffsetMismatch {
                declared: frame.bytes.len() as i64,
                actual: total as i64,
            }),
            None => Err(FrameError::IncompleteFrame {
                expected: required_len(&bytes, usize::MAX)?,
                received: total,
            }),
        }
    }

    pub fn frame_type(&self) -> FrameType {
        self.header.frame_type
    }

    pub fn wire_size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the trailer's CRC-64 matches the frame contents.
    pub fn verify_crc(&self) -> bool {
        let body_end = HEADER_SIZE + self.body.len();
        self.trailer.verify(&self.bytes[..body_end])
    }
}

fn read_i32(src: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
}

/// Bytes needed before the next call can make progress.
///
/// Once the header and the trailer's auth size are buffered this is the exact
/// frame length; before that it is a lower bound.
pub(crate) fn required_len(src: &[u8], max_frame_size: usize) -> Result<usize> {
    if src.len() < HEADER_SIZE {
        return Ok(HEADER_SIZE);
    }

    let trailer_offset = read_i32(src, 4);
    let offset = usize::try_from(trailer_offset)
        .ok()
        .filter(|offset| *offset >= HEADER_SIZE)
        .ok_or_else(|| {
            FrameError::InvalidHeader(format!(
                "trailer offset {trailer_offset} is smaller than the {HEADER_SIZE}-byte header"
            ))
        })?;

    let minimum = offset + TRAILER_FIXED_SIZE;
    if minimum > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: minimum,
            max: max_frame_size,
        });
    }

    let auth_size_at = offset + 4;
    if src.len() < auth_size_at + 4 {
        return Ok(minimum);
    }

    let auth_size = read_i32(src, auth_size_at);
    let auth_size = usize::try_from(auth_size).map_err(|_| {
        FrameError::InvalidHeader(format!("negative trailer authentication size {auth_size}"))
    })?;

    let total = minimum + padded_len(auth_size, ALIGNMENT);
    if total > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: max_frame_size,
        });
    }
    Ok(total)
}

/// Decode one frame from a buffer.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌───────────────────────────── header (36B) ─────────────────────────────┐
/// │ type (4) │ trailer offset (4) │ creator (8) │ dest (8) │ seq (8) │ series (4) │
/// ├──────────────────────────── body (trailer offset - 36) ────────────────┤
/// │ type-specific fields, each variable field padded to 4 bytes            │
/// ├──────────────────────────── trailer ───────────────────────────────────┤
/// │ auth key id (4) │ auth size (4) │ auth value (padded) │ CRC-64 (8)      │
/// └────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes exactly the frame's bytes from the buffer.
pub fn decode_raw_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<RawFrame>> {
    let total = required_len(src, max_frame_size)?;
    if src.len() < total {
        return Ok(None);
    }

    let bytes = src.split_to(total).freeze();
    let header = FrameHeader::decode(bytes.slice(..HEADER_SIZE))?;
    let trailer_start = HEADER_SIZE + header.body_len()?;
    let body = bytes.slice(HEADER_SIZE..trailer_start);
    let trailer = FrameTrailer::decode(bytes.slice(trailer_start..))?;

    Ok(Some(RawFrame {
        header,
        body,
        trailer,
        bytes,
    }))
}

/// Error for a stream that ended with part of a frame buffered.
pub(crate) fn incomplete(src: &BytesMut, max_frame_size: usize) -> FrameError {
    let expected = required_len(src, max_frame_size).unwrap_or(src.len());
    FrameError::IncompleteFrame {
        expected,
        received: src.len(),
    }
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes, header through trailer. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(feature = "async")]
pub use self::tokio_codec::Cd11Codec;

#[cfg(feature = "async")]
mod tokio_codec {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{decode_raw_frame, incomplete, RawFrame, DEFAULT_MAX_FRAME_SIZE};
    use crate::error::FrameError;
    use crate::frame::Cd11Frame;

    /// `tokio_util` codec yielding [`RawFrame`]s.
    #[derive(Debug, Clone)]
    pub struct Cd11Codec {
        max_frame_size: usize,
    }

    impl Cd11Codec {
        pub fn new(max_frame_size: usize) -> Self {
            Self { max_frame_size }
        }
    }

    impl Default for Cd11Codec {
        fn default() -> Self {
            Self::new(DEFAULT_MAX_FRAME_SIZE)
        }
    }

    impl Decoder for Cd11Codec {
        type Item = RawFrame;
        type Error = FrameError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, FrameError> {
            decode_raw_frame(src, self.max_frame_size)
        }

        fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, FrameError> {
            match self.decode(src)? {
                Some(frame) => Ok(Some(frame)),
                None if src.is_empty() => Ok(None),
                None => Err(incomplete(src, self.max_frame_size)),
            }
        }
    }

    impl Encoder<RawFrame> for Cd11Codec {
        type Error = FrameError;

        fn encode(&mut self, item: RawFrame, dst: &mut BytesMut) -> Result<(), FrameError> {
            dst.extend_from_slice(&item.bytes);
            Ok(())
        }
    }

    impl Encoder<Cd11Frame> for Cd11Codec {
        type Error = FrameError;

        fn encode(&mut self, item: Cd11Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
            item.encode(dst)
        }
    }
}
