//! Per-connection protocol state for one station's data stream.
//!
//! [`SessionState`] turns each received frame into a [`SessionAction`] for the
//! socket loop in [`crate::receiver`]. It owns the gap lists the periodic
//! Acknack reports.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use cd11_frame::{Acknack, Cd11Frame, FrameBody, FrameFactory, RawFrame};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StationConfig;
use crate::error::Result;
use crate::gap::{GapList, GapSnapshot};
use crate::record::RawStationRecord;

/// What the socket loop should do after a frame.
#[derive(Debug)]
pub enum SessionAction {
    Continue,
    Reply(Box<Cd11Frame>),
    Record(Box<RawStationRecord>),
    Close(SessionEnd),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    /// The station closed the connection on a frame boundary.
    PeerClosed,
    /// No frame arrived within the expiry window.
    Expired,
    /// The station sent a reset frame.
    Reset,
    /// The receiver is shutting down.
    Shutdown,
    /// A stream or socket error made the connection unusable.
    Failed,
}

/// Frame counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    pub frames_received: u64,
    pub data_frames: u64,
    pub malformed_frames: u64,
    pub crc_failures: u64,
    pub unsupported_frames: u64,
    pub dropped_frames: u64,
    pub acknacks_received: u64,
    pub acknacks_sent: u64,
    pub alerts_received: u64,
}

/// Returned when a session ends.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub station_name: String,
    pub peer: Option<SocketAddr>,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub end: SessionEnd,
    pub counters: SessionCounters,
    pub final_gaps: Option<GapSnapshot>,
    /// Per-channel gap state, keyed by `STA.CHAN.LOC`.
    pub channel_gaps: BTreeMap<String, GapSnapshot>,
}

pub struct SessionState {
    station_name: String,
    factory: FrameFactory,
    verify_crc: bool,
    processing_disabled: bool,
    frame_gaps: GapList,
    channel_gaps: BTreeMap<String, GapList>,
    counters: SessionCounters,
}

impl SessionState {
    pub fn new(station: &StationConfig, verify_crc: bool) -> Self {
        let factory = FrameFactory::new()
            .with_responder_name(station.station_name.as_str())
            .with_responder_type(station.responder_type.as_str())
            .with_service_type(station.service_type.as_str())
            .with_frame_creator(station.frame_creator.as_str())
            .with_frame_destination(station.frame_destination.as_str())
            .with_frameset_acked(format!("{}:{}", station.station_name, station.frame_destination));
        Self {
            station_name: station.station_name.clone(),
            factory,
            verify_crc,
            processing_disabled: station.frame_processing_disabled,
            frame_gaps: GapList::new(),
            channel_gaps: BTreeMap::new(),
            counters: SessionCounters::default(),
        }
    }

    pub fn station_name(&self) -> &str {
        &self.station_name
    }

    pub fn factory(&self) -> &FrameFactory {
        &self.factory
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn frame_gaps(&self) -> &GapList {
        &self.frame_gaps
    }

    /// Gap list for one `site.channel.location`.
    pub fn channel_gaps(&self, channel_id: &str) -> Option<&GapList> {
        self.channel_gaps.get(channel_id)
    }

    /// Process one delimited frame.
    ///
    /// Body decode failures are counted and skipped; only frames that require
    /// an answer or a downstream record produce something other than `Continue`.
    pub fn handle_frame(&mut self, raw: &RawFrame, now: DateTime<Utc>) -> Result<SessionAction> {
        self.counters.frames_received += 1;
        let seq = raw.header.sequence_number;

        if self.processing_disabled {
            self.counters.dropped_frames += 1;
            debug!(station = %self.station_name, seq, frame_type = ?raw.frame_type(), "frame processing disabled, dropping frame");
            return Ok(SessionAction::Continue);
        }

        let crc_valid = self.verify_crc.then(|| raw.verify_crc());
        if crc_valid == Some(false) {
            self.counters.crc_failures += 1;
            warn!(station = %self.station_name, seq, frame_type = ?raw.frame_type(), "CRC mismatch");
        }

        let frame = match Cd11Frame::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                self.counters.malformed_frames += 1;
                warn!(station = %self.station_name, seq, frame_type = ?raw.frame_type(), error = %err, "skipping malformed frame");
                return Ok(SessionAction::Continue);
            }
        };

        match frame.body {
            FrameBody::Data(data) => {
                self.counters.data_frames += 1;
                self.frame_gaps.add(seq, now);
                for subframe in &data.subframes {
                    self.channel_gaps
                        .entry(subframe.channel_id())
                        .or_default()
                        .add(seq, now);
                }
                debug!(station = %self.station_name, seq, channels = data.subframes.len(), "data frame");
                let record =
                    RawStationRecord::from_data_frame(&self.station_name, raw, &data, now, crc_valid);
                Ok(SessionAction::Record(Box::new(record)))
            }
            FrameBody::Acknack(ack) => {
                self.counters.acknacks_received += 1;
                self.apply_station_acknack(&ack, now);
                Ok(SessionAction::Continue)
            }
            FrameBody::Alert(alert) => {
                self.counters.alerts_received += 1;
                info!(station = %self.station_name, message = %alert.message, "station alert");
                Ok(SessionAction::Continue)
            }
            FrameBody::OptionRequest(option) => {
                info!(station = %self.station_name, option_type = option.option_type, "answering option request");
                let reply = self
                    .factory
                    .option_response(option.option_type, option.option_value)?;
                Ok(SessionAction::Reply(Box::new(reply)))
            }
            FrameBody::OptionResponse(_) => {
                info!(station = %self.station_name, "ignoring option response");
                Ok(SessionAction::Continue)
            }
            FrameBody::CommandResponse(response) => {
                self.frame_gaps.add(seq, now);
                warn!(station = %self.station_name, seq, command = %response.command_request_message, "recorded command response sequence number");
                Ok(SessionAction::Continue)
            }
            FrameBody::CommandRequest(_)
            | FrameBody::ConnectionRequest(_)
            | FrameBody::ConnectionResponse(_) => {
                warn!(station = %self.station_name, frame_type = ?raw.frame_type(), "station sent a frame it should never send, ignoring");
                Ok(SessionAction::Continue)
            }
            FrameBody::CustomReset(_) => {
                info!(station = %self.station_name, "reset frame received, clearing gap state");
                self.reset_gaps();
                Ok(SessionAction::Close(SessionEnd::Reset))
            }
            FrameBody::Unsupported { frame_type, body } => {
                self.counters.unsupported_frames += 1;
                debug!(station = %self.station_name, frame_type = ?frame_type, len = body.len(), "unsupported frame");
                Ok(SessionAction::Continue)
            }
        }
    }

    /// Reconcile local gaps with what the station says it can still send.
    fn apply_station_acknack(&mut self, ack: &Acknack, now: DateTime<Utc>) {
        self.factory.set_frameset_acked(ack.frameset_acked.as_str());

        let restarted = self
            .frame_gaps
            .lowest()
            .is_some_and(|lowest| ack.highest_seq < lowest);
        if restarted {
            info!(
                station = %self.station_name,
                station_highest = ack.highest_seq,
                "station sequence numbers restarted, resetting gaps"
            );
            self.reset_gaps();
            return;
        }

        self.frame_gaps.trim_below(ack.lowest_seq, now);
        for gaps in self.channel_gaps.values_mut() {
            gaps.trim_below(ack.lowest_seq, now);
        }
        debug!(
            station = %self.station_name,
            frameset = %ack.frameset_acked,
            lowest = ack.lowest_seq,
            highest = ack.highest_seq,
            gaps = ack.gaps.len(),
            "station acknack"
        );
    }

    fn reset_gaps(&mut self) {
        self.frame_gaps.reset();
        self.channel_gaps.clear();
    }

    /// Drop gaps that have not changed since `cutoff`.
    pub fn sweep_gaps(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = self.frame_gaps.remove_gaps_modified_before(cutoff);
        for gaps in self.channel_gaps.values_mut() {
            removed += gaps.remove_gaps_modified_before(cutoff);
        }
        removed
    }

    /// The Acknack to send now, or `None` before any sequence number was seen.
    pub fn acknack_frame(&self) -> Result<Option<Cd11Frame>> {
        let Some(snapshot) = self.frame_gaps.snapshot() else {
            return Ok(None);
        };
        let frame = self
            .factory
            .acknack(snapshot.lowest, snapshot.highest, snapshot.gaps)?;
        Ok(Some(frame))
    }

    pub fn record_acknack_sent(&mut self) {
        self.counters.acknacks_sent += 1;
    }

    pub fn summary(
        &self,
        peer: Option<SocketAddr>,
        started: DateTime<Utc>,
        end: SessionEnd,
    ) -> SessionSummary {
        SessionSummary {
            station_name: self.station_name.clone(),
            peer,
            started,
            ended: Utc::now(),
            end,
            counters: self.counters.clone(),
            final_gaps: self.frame_gaps.snapshot(),
            channel_gaps: self
                .channel_gaps
                .iter()
                .filter_map(|(id, gaps)| gaps.snapshot().map(|snap| (id.clone(), snap)))
                .collect(),
        }
    }
}
