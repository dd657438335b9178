//! Connection request/response exchange on the rendezvous port.
//!
//! The broker side is a pure function of the request frame and the route
//! table; the station side is a blocking request over `FrameReader`/`FrameWriter`.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use cd11_frame::{
    Cd11Frame, ConnectionBody, FrameBody, FrameFactory, FrameReader, FrameType, FrameWriter,
    RawFrame,
};

use crate::config::BrokerConfig;
use crate::error::{Result, StationError};
use crate::route::{RouteTable, StationRoute};

/// Maximum frame accepted before a station has identified itself.
pub const MAX_HANDSHAKE_FRAME_SIZE: usize = 16 * 1024;

/// Configuration for the broker's side of the handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Time allowed for the station to send its request.
    pub timeout: Duration,
    /// Check the request's CRC. A mismatch is logged, never fatal.
    pub verify_crc: bool,
    pub max_frame_size: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            verify_crc: true,
            max_frame_size: MAX_HANDSHAKE_FRAME_SIZE,
        }
    }
}

impl From<&BrokerConfig> for HandshakeConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            timeout: config.handshake_timeout(),
            ..Self::default()
        }
    }
}

/// Result of a successful broker handshake.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub request: ConnectionBody,
    pub route: StationRoute,
    pub response: Cd11Frame,
    /// `None` when CRC checking is disabled.
    pub crc_valid: Option<bool>,
}

impl HandshakeOutcome {
    pub fn station_name(&self) -> &str {
        &self.request.name
    }
}

/// Build the response to one connection request.
///
/// Fails with [`StationError::UnknownStation`] or [`StationError::IgnoredStation`]
/// when the station must not be redirected.
pub fn respond_to_request(
    raw: &RawFrame,
    routes: &RouteTable,
    factory: &FrameFactory,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome> {
    if raw.frame_type() != FrameType::ConnectionRequest {
        return Err(StationError::HandshakeFailed(format!(
            "expected connection request, got {}",
            raw.frame_type()
        )));
    }

    let crc_valid = config.verify_crc.then(|| raw.verify_crc());
    if crc_valid == Some(false) {
        tracing::warn!(
            creator = %raw.header.creator,
            "connection request failed CRC verification"
        );
    }

    let request = Cd11Frame::decode(raw)?.into_connection_request()?;
    let route = routes.lookup(&request.name)?;
    let port = route.data_port.ok_or_else(|| {
        StationError::HandshakeFailed(format!("no data port for station '{}'", request.name))
    })?;

    let response = factory.connection_response(route.data_address, port, None, None)?;
    Ok(HandshakeOutcome {
        request,
        route,
        response,
        crc_valid,
    })
}

/// Send a connection request and wait for the broker's response (blocking).
pub fn request_connection<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    request: &Cd11Frame,
    timeout: Duration,
) -> Result<ConnectionBody> {
    if request.frame_type() != FrameType::ConnectionRequest {
        return Err(StationError::HandshakeFailed(format!(
            "refusing to send {} as a connection request",
            request.frame_type()
        )));
    }
    writer.write_frame(request)?;

    let deadline = Instant::now() + timeout;
    let raw = match reader.read_frame_until(|| Instant::now() >= deadline) {
        Ok(raw) => raw,
        Err(cd11_frame::FrameError::Timeout) => return Err(StationError::Timeout(timeout)),
        Err(cd11_frame::FrameError::ConnectionClosed) => {
            return Err(StationError::HandshakeFailed(
                "broker closed the connection without responding".into(),
            ))
        }
        Err(err) => return Err(err.into()),
    };

    match Cd11Frame::decode(&raw)?.body {
        FrameBody::ConnectionResponse(body) => Ok(body),
        other => Err(StationError::HandshakeFailed(format!(
            "expected connection response, got {}",
            other.frame_type()
        ))),
    }
}
