//! CD-1.1 station services: the connection broker and per-station data receivers.
//!
//! A station first connects to the [`ConnectionBroker`] on the well-known
//! port and sends a connection request. The broker answers with the address
//! of that station's [`StationDataReceiver`] and closes the socket. The
//! station then streams frames to the receiver, which forwards decoded data
//! as [`RawStationRecord`]s and periodically acknowledges what it has seen.

pub mod broker;
pub mod config;
pub mod connector;
pub mod error;
pub mod gap;
pub mod handshake;
pub mod receiver;
pub mod record;
pub mod route;
pub mod session;

pub use broker::{ConnectionAttempt, ConnectionBroker, ConnectionLog, ConnectionStats};
pub use config::{BrokerConfig, ReceiverConfig, ReceiverSettings, StationConfig};
pub use connector::{connect_to_broker, StationLink};
pub use error::{Result, StationError};
pub use gap::{Gap, GapList, GapSnapshot};
pub use handshake::{request_connection, respond_to_request, HandshakeConfig, HandshakeOutcome};
pub use receiver::{serve_stations, StationDataReceiver};
pub use record::{AuthenticationStatus, RawStationRecord, WaveformSummary};
pub use route::{RouteTable, StationRoute};
pub use session::{SessionAction, SessionCounters, SessionEnd, SessionState, SessionSummary};
