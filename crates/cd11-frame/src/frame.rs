use std::net::Ipv4Addr;

use bytes::{Bytes, BytesMut};

use crate::body::{
    Acknack, Alert, CommandRequest, CommandResponse, ConnectionBody, OptionBody,
};
use crate::codec::RawFrame;
use crate::error::{FrameError, Result};
use crate::header::{trailer_offset_for, FrameHeader, FrameTrailer, FrameType, HEADER_SIZE};
use crate::subframe::DataFrame;

/// Typed frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    ConnectionRequest(ConnectionBody),
    ConnectionResponse(ConnectionBody),
    OptionRequest(OptionBody),
    OptionResponse(OptionBody),
    Acknack(Acknack),
    Alert(Alert),
    CommandRequest(CommandRequest),
    CommandResponse(CommandResponse),
    Data(DataFrame),
    /// Resets the receiver's sequence bookkeeping. The body is not interpreted.
    CustomReset(Bytes),
    /// CD-1 encapsulation and any frame type not modelled here, kept byte for byte.
    Unsupported { frame_type: FrameType, body: Bytes },
}

impl FrameBody {
    /// Decode `body` according to `frame_type`.
    pub fn decode(frame_type: FrameType, body: Bytes) -> Result<Self> {
        Ok(match frame_type {
            FrameType::ConnectionRequest => FrameBody::ConnectionRequest(ConnectionBody::decode(body)?),
            FrameType::ConnectionResponse => {
                FrameBody::ConnectionResponse(ConnectionBody::decode(body)?)
            }
            FrameType::OptionRequest => FrameBody::OptionRequest(OptionBody::decode(body)?),
            FrameType::OptionResponse => FrameBody::OptionResponse(OptionBody::decode(body)?),
            FrameType::Acknack => FrameBody::Acknack(Acknack::decode(body)?),
            FrameType::Alert => FrameBody::Alert(Alert::decode(body)?),
            FrameType::CommandRequest => FrameBody::CommandRequest(CommandRequest::decode(body)?),
            FrameType::CommandResponse => {
                FrameBody::CommandResponse(CommandResponse::decode(body)?)
            }
            FrameType::Data => FrameBody::Data(DataFrame::decode(body)?),
            FrameType::CustomReset => FrameBody::CustomReset(body),
            FrameType::CdOneEncapsulation | FrameType::Unknown(_) => {
                FrameBody::Unsupported { frame_type, body }
            }
        })
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameBody::ConnectionRequest(_) => FrameType::ConnectionRequest,
            FrameBody::ConnectionResponse(_) => FrameType::ConnectionResponse,
            FrameBody::OptionRequest(_) => FrameType::OptionRequest,
            FrameBody::OptionResponse(_) => FrameType::OptionResponse,
            FrameBody::Acknack(_) => FrameType::Acknack,
            FrameBody::Alert(_) => FrameType::Alert,
            FrameBody::CommandRequest(_) => FrameType::CommandRequest,
            FrameBody::CommandResponse(_) => FrameType::CommandResponse,
            FrameBody::Data(_) => FrameType::Data,
            FrameBody::CustomReset(_) => FrameType::CustomReset,
            FrameBody::Unsupported { frame_type, .. } => *frame_type,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            FrameBody::ConnectionRequest(body) | FrameBody::ConnectionResponse(body) => {
                body.encode(dst)
            }
            FrameBody::OptionRequest(body) | FrameBody::OptionResponse(body) => body.encode(dst),
            FrameBody::Acknack(body) => body.encode(dst),
            FrameBody::Alert(body) => body.encode(dst),
            FrameBody::CommandRequest(body) => body.encode(dst),
            FrameBody::CommandResponse(body) => body.encode(dst),
            FrameBody::Data(body) => body.encode(dst),
            FrameBody::CustomReset(body) | FrameBody::Unsupported { body, .. } => {
                dst.extend_from_slice(body);
                Ok(())
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Cd11Frame {
    pub header: FrameHeader,
    pub body: FrameBody,
    pub trailer: FrameTrailer,
}

impl Cd11Frame {
    /// Decode the body of a delimited frame.
    ///
    /// The header and trailer are taken as received; a failure here leaves the
    /// stream on the next frame boundary.
    pub fn decode(raw: &RawFrame) -> Result<Self> {
        let body = FrameBody::decode(raw.header.frame_type, raw.body.clone())?;
        Ok(Self {
            header: raw.header.clone(),
            body,
            trailer: raw.trailer.clone(),
        })
    }

    /// Decode a buffer holding exactly one frame.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        Self::decode(&RawFrame::from_bytes(bytes)?)
    }

    /// Assemble and sign a frame around `body`.
    pub fn signed(
        body: FrameBody,
        creator: impl Into<String>,
        destination: impl Into<String>,
        sequence_number: u64,
        auth_key_id: i32,
    ) -> Result<Self> {
        let body_bytes = body.to_bytes()?;
        let header = FrameHeader::new(
            body.frame_type(),
            body_bytes.len(),
            creator,
            destination,
            sequence_number,
        )?;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_bytes.len());
        header.encode(&mut buf)?;
        buf.extend_from_slice(&body_bytes);
        let trailer = FrameTrailer::sign(auth_key_id, Bytes::new(), &buf);
        Ok(Self {
            header,
            body,
            trailer,
        })
    }

    pub fn frame_type(&self) -> FrameType {
        self.body.frame_type()
    }

    pub fn sequence_number(&self) -> u64 {
        self.header.sequence_number
    }

    /// Encode header, body and the stored trailer.
    ///
    /// The trailer offset is recomputed from the body; the trailer is written
    /// as stored, so a frame whose fields were edited will fail CRC verification
    /// unless it is re-signed.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let body = self.body.to_bytes()?;
        let mut header = self.header.clone();
        header.frame_type = self.body.frame_type();
        header.trailer_offset = trailer_offset_for(body.len())?;

        dst.reserve(HEADER_SIZE + body.len() + self.trailer.wire_size());
        header.encode(dst)?;
        dst.extend_from_slice(&body);
        self.trailer.encode(dst)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Whether the stored CRC matches the encoded frame.
    pub fn verify_crc(&self) -> Result<bool> {
        let bytes = self.to_bytes()?;
        let body_end = bytes.len() - self.trailer.wire_size();
        Ok(self.trailer.verify(&bytes[..body_end]))
    }

    /// Recompute the CRC over the current contents, keeping the auth fields.
    pub fn resign(&mut self) -> Result<()> {
        let bytes = self.to_bytes()?;
        let body_end = bytes.len() - self.trailer.wire_size();
        self.trailer = FrameTrailer::sign(
            self.trailer.auth_key_id,
            self.trailer.auth_value.clone(),
            &bytes[..body_end],
        );
        Ok(())
    }

    /// Copy a connection request or response with a new name and address.
    ///
    /// Every other field, including the sequence number and trailer, is kept.
    pub fn clone_with_identity(&self, name: &str, ip_address: Ipv4Addr, port: u16) -> Result<Self> {
        let mut copy = self.clone();
        match &mut copy.body {
            FrameBody::ConnectionRequest(body) | FrameBody::ConnectionResponse(body) => {
                body.name = name.to_string();
                body.ip_address = ip_address;
                body.port = port;
                Ok(copy)
            }
            other => Err(FrameError::UnexpectedFrameType {
                expected: FrameType::ConnectionRequest,
                actual: other.frame_type(),
            }),
        }
    }

    pub fn as_data(&self) -> Option<&DataFrame> {
        match &self.body {
            FrameBody::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_connection_response(self) -> Result<ConnectionBody> {
        match self.body {
            FrameBody::ConnectionResponse(body) => Ok(body),
            other => Err(FrameError::UnexpectedFrameType {
                expected: FrameType::ConnectionResponse,
                actual: other.frame_type(),
            }),
        }
    }

    pub fn into_connection_request(self) -> Result<ConnectionBody> {
        match self.body {
            FrameBody::ConnectionRequest(body) => Ok(body),
            other => Err(FrameError::UnexpectedFrameType {
                expected: FrameType::ConnectionRequest,
                actual: other.frame_type(),
            }),
        }
    }
}
