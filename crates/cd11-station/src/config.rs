use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use cd11_frame::header::ID_LEN;
use cd11_frame::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StationError};

/// Default rendezvous port for connection requests.
pub const DEFAULT_WELL_KNOWN_PORT: u16 = 8041;

/// Complete receiver configuration, usually loaded from a JSON file.
///
/// Every field has a default, so `{}` is a valid (if station-less) config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub broker: BrokerConfig,
    pub receiver: ReceiverSettings,
    pub stations: Vec<StationConfig>,
}

/// Connection broker ("ConnMan") settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub listen_address: IpAddr,
    pub well_known_port: u16,
    pub responder_name: String,
    pub responder_type: String,
    pub service_type: String,
    pub frame_creator: String,
    pub frame_destination: String,
    pub handshake_timeout_ms: u64,
    /// Address advertised to stations in connection responses.
    pub data_consumer_address: Ipv4Addr,
    /// Base for stations that configure a `port_offset`.
    pub data_consumer_base_port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            well_known_port: DEFAULT_WELL_KNOWN_PORT,
            responder_name: "TEST".to_string(),
            responder_type: "IDC".to_string(),
            service_type: "TCP".to_string(),
            frame_creator: "TEST".to_string(),
            frame_destination: "0".to_string(),
            handshake_timeout_ms: 5_000,
            data_consumer_address: Ipv4Addr::LOCALHOST,
            data_consumer_base_port: 8100,
        }
    }
}

impl BrokerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Data receiver ("DataMan") settings shared by all station sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverSettings {
    /// Address the per-station data listeners bind to.
    pub listen_address: IpAddr,
    pub acknack_interval_secs: u64,
    /// Idle time after which a silent session is closed.
    pub connection_expired_secs: u64,
    /// Gaps untouched for this many days are dropped. Negative disables expiry.
    pub gap_expiration_days: i64,
    pub gap_sweep_interval_secs: u64,
    /// Bound on records queued for the downstream consumer.
    pub sink_capacity: usize,
    pub max_frame_size: usize,
    pub verify_crc: bool,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            acknack_interval_secs: 55,
            connection_expired_secs: 120,
            gap_expiration_days: -1,
            gap_sweep_interval_secs: 3_600,
            sink_capacity: 256,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            verify_crc: true,
        }
    }
}

impl ReceiverSettings {
    pub fn acknack_interval(&self) -> Duration {
        Duration::from_secs(self.acknack_interval_secs)
    }

    pub fn connection_expired(&self) -> Duration {
        Duration::from_secs(self.connection_expired_secs)
    }

    pub fn gap_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.gap_sweep_interval_secs)
    }

    /// Maximum gap age, or `None` when expiry is disabled.
    /// Values too large for a [`chrono::TimeDelta`] are treated as disabled;
    /// [`ReceiverConfig::validate`] rejects them up front.
    pub fn gap_expiration(&self) -> Option<chrono::TimeDelta> {
        if self.gap_expiration_days < 0 {
            return None;
        }
        chrono::TimeDelta::try_days(self.gap_expiration_days)
    }
}

/// One station known to the broker and receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub station_name: String,
    pub responder_type: String,
    pub service_type: String,
    pub frame_creator: String,
    pub frame_destination: String,
    /// Stations that are not acquired are ignored by the broker.
    pub acquired: bool,
    /// Read and drop every frame without processing.
    pub frame_processing_disabled: bool,
    /// Explicit data port. Takes precedence over `port_offset`.
    pub data_port: Option<u16>,
    /// Data port relative to `broker.data_consumer_base_port`.
    pub port_offset: Option<u16>,
    /// Address the station is expected to connect from.
    pub expected_provider_address: Option<IpAddr>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_name: String::new(),
            responder_type: "IDC".to_string(),
            service_type: "TCP".to_string(),
            frame_creator: "TEST".to_string(),
            frame_destination: "0".to_string(),
            acquired: true,
            frame_processing_disabled: false,
            data_port: None,
            port_offset: None,
            expected_provider_address: None,
        }
    }
}

impl StationConfig {
    pub fn new(station_name: impl Into<String>) -> Self {
        Self {
            station_name: station_name.into(),
            ..Self::default()
        }
    }

    pub fn with_data_port(mut self, port: u16) -> Self {
        self.data_port = Some(port);
        self
    }

    pub fn with_acquired(mut self, acquired: bool) -> Self {
        self.acquired = acquired;
        self
    }

    /// Resolve the station's data port against the broker's base port.
    pub fn resolve_data_port(&self, base_port: u16) -> Option<u16> {
        self.data_port
            .or_else(|| self.port_offset.and_then(|o| base_port.checked_add(o)))
    }
}

impl ReceiverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn station(&self, name: &str) -> Option<&StationConfig> {
        self.stations.iter().find(|s| s.station_name == name)
    }

    pub fn data_port(&self, station: &StationConfig) -> Option<u16> {
        station.resolve_data_port(self.broker.data_consumer_base_port)
    }

    /// Reject configurations the broker or receiver could not honor.
    pub fn validate(&self) -> Result<()> {
        if self.receiver.sink_capacity == 0 {
            return Err(StationError::Config("receiver.sink_capacity must be > 0".into()));
        }
        if self.receiver.acknack_interval_secs == 0 {
            return Err(StationError::Config(
                "receiver.acknack_interval_secs must be > 0".into(),
            ));
        }
        if self.receiver.gap_expiration_days >= 0 && self.receiver.gap_expiration().is_none() {
            return Err(StationError::Config(format!(
                "receiver.gap_expiration_days {} is out of range",
                self.receiver.gap_expiration_days
            )));
        }

        let mut seen = HashSet::new();
        for station in &self.stations {
            let name = station.station_name.as_str();
            if name.is_empty() {
                return Err(StationError::Config("station_name must not be empty".into()));
            }
            if name.len() > ID_LEN {
                return Err(StationError::Config(format!(
                    "station_name '{name}' exceeds {ID_LEN} characters"
                )));
            }
            if !seen.insert(name) {
                return Err(StationError::Config(format!("duplicate station '{name}'")));
            }
            if station.acquired && self.data_port(station).is_none() {
                return Err(StationError::Config(format!(
                    "station '{name}' has no data_port or port_offset"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ReceiverConfig::from_json("{}").unwrap();
        assert_eq!(config.broker.well_known_port, DEFAULT_WELL_KNOWN_PORT);
        assert_eq!(config.broker.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.receiver.acknack_interval(), Duration::from_secs(55));
        assert_eq!(config.receiver.connection_expired(), Duration::from_secs(120));
        assert_eq!(config.receiver.gap_expiration(), None);
        assert!(config.stations.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn station_fields_default_individually() {
        let config = ReceiverConfig::from_json(
            r#"{
                "broker": { "data_consumer_base_port": 9000 },
                "stations": [
                    { "station_name": "AAA", "data_port": 8155 },
                    { "station_name": "BBB", "port_offset": 3, "frame_processing_disabled": true },
                    { "station_name": "CCC", "acquired": false }
                ]
            }"#,
        )
        .unwrap();
        config.validate().unwrap();

        let aaa = config.station("AAA").unwrap();
        assert!(aaa.acquired);
        assert_eq!(aaa.service_type, "TCP");
        assert_eq!(config.data_port(aaa), Some(8155));

        let bbb = config.station("BBB").unwrap();
        assert!(bbb.frame_processing_disabled);
        assert_eq!(config.data_port(bbb), Some(9003));

        let ccc = config.station("CCC").unwrap();
        assert!(!ccc.acquired);
        assert_eq!(config.data_port(ccc), None);
    }

    #[test]
    fn explicit_port_wins_over_offset() {
        let station = StationConfig {
            data_port: Some(7000),
            port_offset: Some(5),
            ..StationConfig::new("AAA")
        };
        assert_eq!(station.resolve_data_port(8100), Some(7000));
    }

    #[test]
    fn offset_overflow_is_unresolved() {
        let station = StationConfig {
            port_offset: Some(10),
            ..StationConfig::new("AAA")
        };
        assert_eq!(station.resolve_data_port(u16::MAX - 5), None);
    }

    #[test]
    fn rejects_duplicate_station() {
        let config = ReceiverConfig {
            stations: vec![
                StationConfig::new("AAA").with_data_port(1),
                StationConfig::new("AAA").with_data_port(2),
            ],
            ..ReceiverConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StationError::Config(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_long_station_name() {
        let config = ReceiverConfig {
            stations: vec![StationConfig::new("TOOLONGNAME").with_data_port(1)],
            ..ReceiverConfig::default()
        };
        assert!(matches!(config.validate(), Err(StationError::Config(_))));
    }

    #[test]
    fn rejects_acquired_station_without_port() {
        let config = ReceiverConfig {
            stations: vec![StationConfig::new("AAA")],
            ..ReceiverConfig::default()
        };
        assert!(matches!(config.validate(), Err(StationError::Config(_))));

        let ignored = ReceiverConfig {
            stations: vec![StationConfig::new("AAA").with_acquired(false)],
            ..ReceiverConfig::default()
        };
        ignored.validate().unwrap();
    }

    #[test]
    fn rejects_unrepresentable_gap_expiration() {
        let mut config = ReceiverConfig::default();
        config.receiver.gap_expiration_days = i64::MAX;
        assert_eq!(config.receiver.gap_expiration(), None);
        assert!(matches!(config.validate(), Err(StationError::Config(msg)) if msg.contains("gap_expiration_days")));

        config.receiver.gap_expiration_days = 30;
        assert_eq!(config.receiver.gap_expiration(), Some(chrono::TimeDelta::days(30)));
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_sink_capacity() {
        let mut config = ReceiverConfig::default();
        config.receiver.sink_capacity = 0;
        assert!(matches!(config.validate(), Err(StationError::Config(_))));
    }

    #[test]
    fn load_reads_and_validates_file() {
        let path = std::env::temp_dir().join(format!(
            "cd11-config-{}-{}.json",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::write(
            &path,
            r#"{ "stations": [ { "station_name": "AAA", "data_port": 8155 } ] }"#,
        )
        .expect("config should be writable");

        let config = ReceiverConfig::load(&path).unwrap();
        assert_eq!(config.stations.len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_reports_bad_json() {
        let path = std::env::temp_dir().join(format!("cd11-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").expect("config should be writable");
        assert!(matches!(
            ReceiverConfig::load(&path),
            Err(StationError::Json(_))
        ));
        std::fs::remove_file(&path).ok();
    }
}
