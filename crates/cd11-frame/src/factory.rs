use std::net::Ipv4Addr;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::body::{
    Acknack, Alert, CommandRequest, CommandResponse, CommandTarget, ConnectionBody, OptionBody,
    SequenceRange,
};
use crate::error::Result;
use crate::frame::{Cd11Frame, FrameBody};
use crate::subframe::{ChannelSubframe, DataFrame};

/// Builds signed outbound frames with a fixed identity.
///
/// Control frames carry sequence number 0; data frames take the caller's.
#[derive(Debug, Clone)]
pub struct FrameFactory {
    auth_key_id: i32,
    frame_creator: String,
    frame_destination: String,
    protocol_major_version: i16,
    protocol_minor_version: i16,
    responder_name: String,
    responder_type: String,
    service_type: String,
    frameset_acked: String,
}

impl Default for FrameFactory {
    fn default() -> Self {
        Self {
            auth_key_id: 0,
            frame_creator: "TEST".to_string(),
            frame_destination: "0".to_string(),
            protocol_major_version: 1,
            protocol_minor_version: 1,
            responder_name: "DC".to_string(),
            responder_type: "IDC".to_string(),
            service_type: "TCP".to_string(),
            frameset_acked: "TEST:0".to_string(),
        }
    }
}

impl FrameFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_key_id(mut self, auth_key_id: i32) -> Self {
        self.auth_key_id = auth_key_id;
        self
    }

    pub fn with_frame_creator(mut self, creator: impl Into<String>) -> Self {
        self.frame_creator = creator.into();
        self
    }

    pub fn with_frame_destination(mut self, destination: impl Into<String>) -> Self {
        self.frame_destination = destination.into();
        self
    }

    pub fn with_protocol_version(mut self, major: i16, minor: i16) -> Self {
        self.protocol_major_version = major;
        self.protocol_minor_version = minor;
        self
    }

    pub fn with_responder_name(mut self, name: impl Into<String>) -> Self {
        self.responder_name = name.into();
        self
    }

    pub fn with_responder_type(mut self, responder_type: impl Into<String>) -> Self {
        self.responder_type = responder_type.into();
        self
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    pub fn with_frameset_acked(mut self, frameset_acked: impl Into<String>) -> Self {
        self.frameset_acked = frameset_acked.into();
        self
    }

    pub fn frame_creator(&self) -> &str {
        &self.frame_creator
    }

    pub fn frame_destination(&self) -> &str {
        &self.frame_destination
    }

    pub fn responder_name(&self) -> &str {
        &self.responder_name
    }

    pub fn frameset_acked(&self) -> &str {
        &self.frameset_acked
    }

    /// Update the label echoed in outgoing acknacks after the station reports its own.
    pub fn set_frameset_acked(&mut self, frameset_acked: impl Into<String>) {
        self.frameset_acked = frameset_acked.into();
    }

    fn sign(&self, body: FrameBody, sequence_number: u64) -> Result<Cd11Frame> {
        Cd11Frame::signed(
            body,
            self.frame_creator.as_str(),
            self.frame_destination.as_str(),
            sequence_number,
            self.auth_key_id,
        )
    }

    fn connection_body(&self, name: &str, node_type: &str, ip: Ipv4Addr, port: u16) -> ConnectionBody {
        ConnectionBody {
            major_version: self.protocol_major_version,
            minor_version: self.protocol_minor_version,
            name: name.to_string(),
            node_type: node_type.to_string(),
            service_type: self.service_type.clone(),
            ip_address: ip,
            port,
            second_ip_address: None,
            second_port: None,
        }
    }

    pub fn acknack(&self, lowest_seq: u64, highest_seq: u64, gaps: Vec<SequenceRange>) -> Result<Cd11Frame> {
        self.sign(
            FrameBody::Acknack(Acknack {
                frameset_acked: self.frameset_acked.clone(),
                lowest_seq,
                highest_seq,
                gaps,
            }),
            0,
        )
    }

    pub fn alert(&self, message: impl Into<String>) -> Result<Cd11Frame> {
        self.sign(
            FrameBody::Alert(Alert {
                message: message.into(),
            }),
            0,
        )
    }

    /// Request sent by a station, announcing its own listening address.
    pub fn connection_request(
        &self,
        station_name: &str,
        station_type: &str,
        local_ip: Ipv4Addr,
        local_port: u16,
    ) -> Result<Cd11Frame> {
        let body = self.connection_body(station_name, station_type, local_ip, local_port);
        self.sign(FrameBody::ConnectionRequest(body), 0)
    }

    /// Response naming the endpoint the station should reconnect to.
    pub fn connection_response(
        &self,
        ip: Ipv4Addr,
        port: u16,
        second_ip: Option<Ipv4Addr>,
        second_port: Option<u16>,
    ) -> Result<Cd11Frame> {
        let mut body = self.connection_body(&self.responder_name, &self.responder_type, ip, port);
        body.second_ip_address = second_ip;
        body.second_port = second_port;
        self.sign(FrameBody::ConnectionResponse(body), 0)
    }

    pub fn data(&self, subframes: Vec<ChannelSubframe>, sequence_number: u64) -> Result<Cd11Frame> {
        let data = DataFrame::from_subframes(subframes)?;
        self.sign(FrameBody::Data(data), sequence_number)
    }

    pub fn option_request(&self, option_type: i32, value: impl Into<String>) -> Result<Cd11Frame> {
        self.sign(
            FrameBody::OptionRequest(OptionBody {
                option_type,
                option_value: value.into(),
            }),
            0,
        )
    }

    pub fn option_response(&self, option_type: i32, value: impl Into<String>) -> Result<Cd11Frame> {
        self.sign(
            FrameBody::OptionResponse(OptionBody {
                option_type,
                option_value: value.into(),
            }),
            0,
        )
    }

    pub fn command_request(
        &self,
        station: &str,
        site: &str,
        channel: &str,
        location: &str,
        timestamp: DateTime<Utc>,
        command: impl Into<String>,
    ) -> Result<Cd11Frame> {
        self.sign(
            FrameBody::CommandRequest(CommandRequest {
                target: command_target(station, site, channel, location, timestamp),
                command_message: command.into(),
            }),
            0,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn command_response(
        &self,
        station: &str,
        site: &str,
        channel: &str,
        location: &str,
        timestamp: DateTime<Utc>,
        command: impl Into<String>,
        response: impl Into<String>,
        sequence_number: u64,
    ) -> Result<Cd11Frame> {
        self.sign(
            FrameBody::CommandResponse(CommandResponse {
                target: command_target(station, site, channel, location, timestamp),
                command_request_message: command.into(),
                response_message: response.into(),
            }),
            sequence_number,
        )
    }

    pub fn custom_reset(&self, body: impl Into<Bytes>) -> Result<Cd11Frame> {
        self.sign(FrameBody::CustomReset(body.into()), 0)
    }
}

fn command_target(
    station: &str,
    site: &str,
    channel: &str,
    location: &str,
    timestamp: DateTime<Utc>,
) -> CommandTarget {
    CommandTarget {
        station: station.to_string(),
        site: site.to_string(),
        channel: channel.to_string(),
        location: location.to_string(),
        timestamp,
    }
}
