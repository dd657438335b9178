//! CD-1.1 frame model and stream framing.
//!
//! Every frame is a 36-byte header, a type-specific body, and a trailer with
//! an opaque authentication value and a CRC-64. The header's trailer offset
//! is the only delimiter, so readers consume exactly one frame at a time:
//! - [`FrameReader`] / [`FrameWriter`] over blocking `Read`/`Write`
//! - [`Cd11Codec`], `AsyncFrameReader` and `AsyncFrameWriter` with the `async` feature
//!
//! [`Cd11Frame::decode`] turns a [`RawFrame`] into a typed [`FrameBody`];
//! frame types that are not modelled decode to [`FrameBody::Unsupported`].

#[cfg(feature = "async")]
pub mod async_io;
pub mod body;
pub mod codec;
pub mod crc;
pub mod error;
pub mod factory;
pub mod frame;
pub mod header;
pub mod reader;
pub mod status;
pub mod subframe;
pub mod timestamp;
pub mod wire;
pub mod writer;

#[cfg(feature = "async")]
pub use async_io::{AsyncFrameReader, AsyncFrameWriter};
pub use body::{
    Acknack, Alert, CommandRequest, CommandResponse, CommandTarget, ConnectionBody, OptionBody,
    SequenceRange,
};
#[cfg(feature = "async")]
pub use codec::Cd11Codec;
pub use codec::{decode_raw_frame, FrameConfig, RawFrame, DEFAULT_MAX_FRAME_SIZE};
pub use error::{FrameError, Result};
pub use factory::FrameFactory;
pub use frame::{Cd11Frame, FrameBody};
pub use header::{FrameHeader, FrameTrailer, FrameType, HEADER_SIZE};
pub use reader::FrameReader;
pub use status::{ChannelStatus, StatusFlag};
pub use subframe::{ChannelSubframe, ChannelSubframeHeader, DataFrame};
pub use timestamp::{format_timestamp, parse_timestamp};
pub use writer::FrameWriter;
