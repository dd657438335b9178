//! Per-station data receiver ("DataMan").
//!
//! Each acquired station gets its own listener. A connection runs one session:
//! a read loop that dispatches frames through [`SessionState`], plus a
//! separate task that writes an Acknack on a fixed interval.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cd11_frame::{AsyncFrameReader, AsyncFrameWriter, FrameConfig, FrameError};
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ReceiverConfig, ReceiverSettings, StationConfig};
use crate::error::{Result, StationError};
use crate::record::RawStationRecord;
use crate::session::{SessionAction, SessionEnd, SessionState, SessionSummary};

/// Time allowed for the farewell Alert on shutdown.
const SHUTDOWN_ALERT_TIMEOUT: Duration = Duration::from_secs(1);

type SharedWriter<W> = Arc<tokio::sync::Mutex<AsyncFrameWriter<W>>>;

/// A spawned session and the token that stops it.
type ActiveSession = (CancellationToken, JoinHandle<Result<SessionSummary>>);

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receives one station's continuous frame stream.
#[derive(Clone)]
pub struct StationDataReceiver {
    station: StationConfig,
    settings: ReceiverSettings,
    bind_addr: SocketAddr,
    acknack_interval: Duration,
    connection_expired: Duration,
    sink: mpsc::Sender<RawStationRecord>,
}

impl StationDataReceiver {
    pub fn new(
        station: StationConfig,
        settings: ReceiverSettings,
        port: u16,
        sink: mpsc::Sender<RawStationRecord>,
    ) -> Self {
        Self {
            bind_addr: SocketAddr::new(settings.listen_address, port),
            acknack_interval: settings.acknack_interval(),
            connection_expired: settings.connection_expired(),
            station,
            settings,
            sink,
        }
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_acknack_interval(mut self, interval: Duration) -> Self {
        self.acknack_interval = interval;
        self
    }

    /// Close sessions that stay silent for `limit`.
    pub fn with_connection_expired(mut self, limit: Duration) -> Self {
        self.connection_expired = limit;
        self
    }

    pub fn station_name(&self) -> &str {
        &self.station.station_name
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.bind_addr).await?)
    }

    /// Accept station connections until `cancel` fires.
    ///
    /// A new connection from the station replaces the session in progress.
    pub async fn run(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let station = self.station_name();
        info!(station = %station, addr = %listener.local_addr()?, "data receiver listening");

        let mut current: Option<ActiveSession> = None;
        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(station = %station, error = %err, "accept failed");
                        continue;
                    }
                },
            };

            if let Some(expected) = self.station.expected_provider_address {
                if peer.ip() != expected {
                    warn!(station = %station, %peer, %expected, "connection from unexpected provider address");
                }
            }
            if let Some(previous) = current.take() {
                info!(station = %station, %peer, "new connection replaces active session");
                finish_session(station, previous).await;
            }

            let session_cancel = cancel.child_token();
            let receiver = self.clone();
            let token = session_cancel.clone();
            let handle =
                tokio::spawn(async move { receiver.run_session(stream, Some(peer), token).await });
            current = Some((session_cancel, handle));
        }

        if let Some(session) = current {
            finish_session(station, session).await;
        }
        info!(station = %station, "data receiver stopped");
        Ok(())
    }

    /// Run one session over an established connection until it ends.
    pub async fn run_session<S>(
        &self,
        stream: S,
        peer: Option<SocketAddr>,
        cancel: CancellationToken,
    ) -> Result<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let station = self.station_name().to_string();
        let started = Utc::now();
        info!(station = %station, peer = ?peer, "session started");

        let (rd, wr) = tokio::io::split(stream);
        let frame_config = FrameConfig {
            max_frame_size: self.settings.max_frame_size,
            ..FrameConfig::default()
        };
        let mut reader = AsyncFrameReader::with_config(rd, &frame_config);
        let writer: SharedWriter<WriteHalf<S>> =
            Arc::new(tokio::sync::Mutex::new(AsyncFrameWriter::new(wr)));
        let state = Arc::new(Mutex::new(SessionState::new(
            &self.station,
            self.settings.verify_crc,
        )));

        let session_cancel = cancel.child_token();
        let acknacks = tokio::spawn(send_acknacks(
            Arc::clone(&state),
            Arc::clone(&writer),
            self.acknack_interval,
            session_cancel.clone(),
        ));

        let gap_expiration = self.settings.gap_expiration();
        let sweep_period = self.settings.gap_sweep_interval().max(Duration::from_secs(1));
        let mut sweep = tokio::time::interval_at(Instant::now() + sweep_period, sweep_period);
        let mut idle_deadline = Instant::now() + self.connection_expired;
        let mut sink_closed = false;

        let end = loop {
            let next = tokio::select! {
                _ = tokio::time::sleep_until(idle_deadline) => {
                    info!(station = %station, "no frames received, connection expired");
                    break SessionEnd::Expired;
                }
                _ = sweep.tick(), if gap_expiration.is_some() => {
                    let cutoff =
                        gap_expiration.and_then(|age| Utc::now().checked_sub_signed(age));
                    if let Some(cutoff) = cutoff {
                        let removed = lock(&state).sweep_gaps(cutoff);
                        if removed > 0 {
                            debug!(station = %station, removed, "expired gaps removed");
                        }
                    }
                    continue;
                }
                next = reader.read_frame(&session_cancel) => next,
            };

            let raw = match next {
                Ok(raw) => raw,
                Err(FrameError::Timeout) => break SessionEnd::Shutdown,
                Err(FrameError::ConnectionClosed) => {
                    info!(station = %station, "station closed the connection");
                    break SessionEnd::PeerClosed;
                }
                Err(err) => {
                    warn!(station = %station, error = %err, "frame stream failed");
                    break SessionEnd::Failed;
                }
            };
            idle_deadline = Instant::now() + self.connection_expired;

            let action = lock(&state).handle_frame(&raw, Utc::now());
            match action {
                Ok(SessionAction::Continue) => {}
                Ok(SessionAction::Reply(frame)) => {
                    if let Err(err) = writer.lock().await.write_frame(*frame).await {
                        warn!(station = %station, error = %err, "failed to send reply");
                        break SessionEnd::Failed;
                    }
                }
                Ok(SessionAction::Record(record)) => {
                    // Blocks the read loop while the consumer is behind.
                    let sent = tokio::select! {
                        biased;
                        _ = session_cancel.cancelled() => break SessionEnd::Shutdown,
                        sent = self.sink.send(*record) => sent,
                    };
                    if sent.is_err() {
                        warn!(station = %station, "record sink closed");
                        sink_closed = true;
                        break SessionEnd::Failed;
                    }
                }
                Ok(SessionAction::Close(end)) => break end,
                Err(err) => warn!(station = %station, error = %err, "failed to handle frame"),
            }
        };

        if end == SessionEnd::Shutdown {
            let alert = lock(&state).factory().alert("Shutting down.");
            match alert {
                Ok(alert) => {
                    let mut writer = writer.lock().await;
                    let sent = tokio::time::timeout(SHUTDOWN_ALERT_TIMEOUT, writer.write_frame(alert)).await;
                    if !matches!(sent, Ok(Ok(()))) {
                        debug!(station = %station, "shutdown alert not delivered");
                    }
                }
                Err(err) => debug!(station = %station, error = %err, "could not build shutdown alert"),
            }
        }

        session_cancel.cancel();
        let _ = acknacks.await;
        let _ = writer.lock().await.close().await;

        let summary = lock(&state).summary(peer, started, end);
        info!(
            station = %station,
            end = ?summary.end,
            frames = summary.counters.frames_received,
            data_frames = summary.counters.data_frames,
            malformed = summary.counters.malformed_frames,
            "session ended"
        );
        if sink_closed {
            return Err(StationError::SinkClosed);
        }
        Ok(summary)
    }
}

/// Stop a session and wait for it, so two sessions never share a station.
async fn finish_session(station: &str, (token, handle): ActiveSession) {
    token.cancel();
    match handle.await {
        Ok(Ok(summary)) => debug!(
            station = %station,
            peer = ?summary.peer,
            end = ?summary.end,
            frames = summary.counters.frames_received,
            "session task finished"
        ),
        Ok(Err(err)) => warn!(station = %station, error = %err, "session failed"),
        Err(err) => warn!(station = %station, error = %err, "session task panicked"),
    }
}

/// Write the current Acknack every `period` until `cancel` fires.
///
/// Only the frame build takes the state lock, so the read loop is never
/// held up by a slow socket write.
async fn send_acknacks<W: AsyncWrite + Unpin>(
    state: Arc<Mutex<SessionState>>,
    writer: SharedWriter<W>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let (station, frame) = {
            let state = lock(&state);
            (state.station_name().to_string(), state.acknack_frame())
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => {
                warn!(station = %station, error = %err, "failed to build acknack");
                continue;
            }
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = async { writer.lock().await.write_frame(frame).await } => sent,
        };
        if let Err(err) = sent {
            warn!(station = %station, error = %err, "failed to send acknack");
            break;
        }
        lock(&state).record_acknack_sent();
        debug!(station = %station, "acknack sent");
    }
}

/// Run a receiver for every acquired station until `cancel` fires.
///
/// All listeners are bound before any is served, so a port conflict fails
/// the whole call.
pub async fn serve_stations(
    config: &ReceiverConfig,
    sink: mpsc::Sender<RawStationRecord>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut bound = Vec::new();
    for station in config.stations.iter().filter(|s| s.acquired) {
        let port = config.data_port(station).ok_or_else(|| {
            StationError::Config(format!("station '{}' has no data port", station.station_name))
        })?;
        let receiver = StationDataReceiver::new(
            station.clone(),
            config.receiver.clone(),
            port,
            sink.clone(),
        );
        let listener = receiver.bind().await?;
        bound.push((receiver, listener));
    }
    drop(sink);

    let mut tasks = JoinSet::new();
    for (receiver, listener) in bound {
        let cancel = cancel.clone();
        tasks.spawn(async move { receiver.run(listener, cancel).await });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "data receiver failed"),
            Err(err) => warn!(error = %err, "data receiver task panicked"),
        }
    }
    Ok(())
}
