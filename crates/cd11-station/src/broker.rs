//! Connection broker ("ConnMan").
//!
//! Accepts connection requests on the rendezvous port, answers each with the
//! station's data endpoint, and closes the socket. Each connection is handled
//! by its own task; the route table is the only shared state.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cd11_frame::{AsyncFrameReader, AsyncFrameWriter, FrameConfig, FrameError, FrameFactory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReceiverConfig;
use crate::error::{Result, StationError};
use crate::handshake::{respond_to_request, HandshakeConfig, HandshakeOutcome};
use crate::route::RouteTable;

/// Handshakes kept in the connection log.
pub const CONNECTION_LOG_CAPACITY: usize = 100;

/// One handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionAttempt {
    pub station_name: Option<String>,
    pub peer: SocketAddr,
    pub accepted: bool,
    pub reason: Option<String>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
}

/// Bounded history of handshake attempts plus running totals.
#[derive(Debug, Default)]
pub struct ConnectionLog {
    entries: Mutex<VecDeque<ConnectionAttempt>>,
    total: AtomicU64,
    valid: AtomicU64,
    invalid: AtomicU64,
}

impl ConnectionLog {
    pub fn record(&self, attempt: ConnectionAttempt) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if attempt.accepted {
            self.valid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.invalid.fetch_add(1, Ordering::Relaxed);
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == CONNECTION_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(attempt);
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<ConnectionAttempt> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total: self.total.load(Ordering::Relaxed),
            valid: self.valid.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
        }
    }
}

/// Redirects stations to their data receivers.
#[derive(Clone)]
pub struct ConnectionBroker {
    bind_addr: SocketAddr,
    routes: Arc<RouteTable>,
    factory: FrameFactory,
    handshake: HandshakeConfig,
    log: Arc<ConnectionLog>,
}

impl ConnectionBroker {
    pub fn new(config: &ReceiverConfig) -> Self {
        let broker = &config.broker;
        let factory = FrameFactory::new()
            .with_responder_name(broker.responder_name.as_str())
            .with_responder_type(broker.responder_type.as_str())
            .with_service_type(broker.service_type.as_str())
            .with_frame_creator(broker.frame_creator.as_str())
            .with_frame_destination(broker.frame_destination.as_str());
        Self {
            bind_addr: SocketAddr::new(broker.listen_address, broker.well_known_port),
            routes: Arc::new(RouteTable::from_config(config)),
            factory,
            handshake: HandshakeConfig {
                verify_crc: config.receiver.verify_crc,
                ..HandshakeConfig::from(broker)
            },
            log: Arc::new(ConnectionLog::default()),
        }
    }

    /// Override the rendezvous address, e.g. port 0 in tests.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Share a route table with other components.
    pub fn with_routes(mut self, routes: Arc<RouteTable>) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake = config;
        self
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn connection_log(&self) -> &Arc<ConnectionLog> {
        &self.log
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.bind_addr).await?)
    }

    /// Accept connections until `cancel` fires.
    pub async fn run(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        info!(addr = %listener.local_addr()?, stations = self.routes.len(), "connection broker listening");

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                },
            };

            let broker = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => debug!(%peer, "handshake abandoned on shutdown"),
                    _ = broker.handle_tcp(stream, peer) => {}
                }
            });
        }

        info!("connection broker stopped");
        Ok(())
    }

    async fn handle_tcp(&self, stream: TcpStream, peer: SocketAddr) {
        let (rd, wr) = stream.into_split();
        // Errors are logged and recorded inside; the socket closes on drop.
        let _ = self.handle_connection(rd, wr, peer).await;
    }

    /// Run one request/response exchange and record it in the connection log.
    pub async fn handle_connection<R, W>(
        &self,
        rd: R,
        wr: W,
        peer: SocketAddr,
    ) -> Result<HandshakeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.exchange(rd, wr).await;
        let time = Utc::now();

        let attempt = match &result {
            Ok(outcome) => {
                info!(
                    station = %outcome.station_name(),
                    %peer,
                    port = outcome.route.data_port.unwrap_or_default(),
                    "station redirected to data endpoint"
                );
                ConnectionAttempt {
                    station_name: Some(outcome.station_name().to_string()),
                    peer,
                    accepted: true,
                    reason: None,
                    time,
                }
            }
            Err(err) => {
                let station_name = match err {
                    StationError::UnknownStation(name) | StationError::IgnoredStation(name) => {
                        Some(name.clone())
                    }
                    _ => None,
                };
                match err {
                    StationError::IgnoredStation(name) => {
                        info!(station = %name, %peer, "ignoring unacquired station")
                    }
                    _ => warn!(%peer, error = %err, "connection request refused"),
                }
                ConnectionAttempt {
                    station_name,
                    peer,
                    accepted: false,
                    reason: Some(err.to_string()),
                    time,
                }
            }
        };
        self.log.record(attempt);
        result
    }

    async fn exchange<R, W>(&self, rd: R, wr: W) -> Result<HandshakeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let frame_config = FrameConfig {
            max_frame_size: self.handshake.max_frame_size,
            ..FrameConfig::default()
        };
        let mut reader = AsyncFrameReader::with_config(rd, &frame_config);
        let mut writer = AsyncFrameWriter::new(wr);

        let raw = match reader.read_frame_timeout(self.handshake.timeout).await {
            Ok(raw) => raw,
            Err(FrameError::Timeout) => return Err(StationError::Timeout(self.handshake.timeout)),
            Err(err) => return Err(err.into()),
        };

        let outcome = respond_to_request(&raw, &self.routes, &self.factory, &self.handshake)?;
        writer.write_frame(outcome.response.clone()).await?;
        writer.close().await?;
        Ok(outcome)
    }
}
