//! Channel status block carried by each data subframe.
//!
//! The block is kept as raw bytes. Accessors read flags and values at fixed
//! offsets and setters rewrite only the targeted bits, so every other byte is
//! re-emitted unchanged.
//!
//! ```text
//! byte 0       status format
//! byte 1       data status flags         (bits 0-3)
//! byte 2       security flags            (bits 0-4)
//! byte 3       miscellaneous flags       (bits 0-4)
//! byte 4       voltage indicators        (bits 0-1)
//! bytes 8-27   time of last GPS sync     (yyyyddd hh:mm:ss.mmm)
//! bytes 28-31  clock differential, µs    (i32, big-endian)
//! ```

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{FrameError, Result};
use crate::timestamp::{format_timestamp, parse_timestamp, TIMESTAMP_LEN};

const GPS_SYNC_OFFSET: usize = 8;
const CLOCK_DIFFERENTIAL_OFFSET: usize = 28;

/// Size of a status block carrying every documented field.
pub const FULL_STATUS_SIZE: usize = 32;

/// A boolean environmental or data-quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    DeadSensor,
    ZeroedData,
    Clipped,
    CalibrationUnderway,
    EquipmentHousingOpen,
    DigitizingEquipmentOpen,
    VaultDoorOpened,
    AuthenticationSealBroken,
    EquipmentMoved,
    ClockDifferentialTooLarge,
    GpsReceiverOff,
    GpsReceiverUnlocked,
    DigitizerAnalogInputShorted,
    DigitizerCalibrationLoopBack,
    MainPowerFailure,
    BackupPowerUnstable,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 16] = [
        StatusFlag::DeadSensor,
        StatusFlag::ZeroedData,
        StatusFlag::Clipped,
        StatusFlag::CalibrationUnderway,
        StatusFlag::EquipmentHousingOpen,
        StatusFlag::DigitizingEquipmentOpen,
        StatusFlag::VaultDoorOpened,
        StatusFlag::AuthenticationSealBroken,
        StatusFlag::EquipmentMoved,
        StatusFlag::ClockDifferentialTooLarge,
        StatusFlag::GpsReceiverOff,
        StatusFlag::GpsReceiverUnlocked,
        StatusFlag::DigitizerAnalogInputShorted,
        StatusFlag::DigitizerCalibrationLoopBack,
        StatusFlag::MainPowerFailure,
        StatusFlag::BackupPowerUnstable,
    ];

    /// `(byte, bit)` position of the flag in the status block.
    pub fn position(self) -> (usize, u8) {
        match self {
            StatusFlag::DeadSensor => (1, 0),
            StatusFlag::ZeroedData => (1, 1),
            StatusFlag::Clipped => (1, 2),
            StatusFlag::CalibrationUnderway => (1, 3),
            StatusFlag::EquipmentHousingOpen => (2, 0),
            StatusFlag::DigitizingEquipmentOpen => (2, 1),
            StatusFlag::VaultDoorOpened => (2, 2),
            StatusFlag::AuthenticationSealBroken => (2, 3),
            StatusFlag::EquipmentMoved => (2, 4),
            StatusFlag::ClockDifferentialTooLarge => (3, 0),
            StatusFlag::GpsReceiverOff => (3, 1),
            StatusFlag::GpsReceiverUnlocked => (3, 2),
            StatusFlag::DigitizerAnalogInputShorted => (3, 3),
            StatusFlag::DigitizerCalibrationLoopBack => (3, 4),
            StatusFlag::MainPowerFailure => (4, 0),
            StatusFlag::BackupPowerUnstable => (4, 1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StatusFlag::DeadSensor => "dead_sensor",
            StatusFlag::ZeroedData => "zeroed_data",
            StatusFlag::Clipped => "clipped",
            StatusFlag::CalibrationUnderway => "calibration_underway",
            StatusFlag::EquipmentHousingOpen => "equipment_housing_open",
            StatusFlag::DigitizingEquipmentOpen => "digitizing_equipment_open",
            StatusFlag::VaultDoorOpened => "vault_door_opened",
            StatusFlag::AuthenticationSealBroken => "authentication_seal_broken",
            StatusFlag::EquipmentMoved => "equipment_moved",
            StatusFlag::ClockDifferentialTooLarge => "clock_differential_too_large",
            StatusFlag::GpsReceiverOff => "gps_receiver_off",
            StatusFlag::GpsReceiverUnlocked => "gps_receiver_unlocked",
            StatusFlag::DigitizerAnalogInputShorted => "digitizer_analog_input_shorted",
            StatusFlag::DigitizerCalibrationLoopBack => "digitizer_calibration_loop_back",
            StatusFlag::MainPowerFailure => "main_power_failure",
            StatusFlag::BackupPowerUnstable => "backup_power_unstable",
        }
    }
}

/// Raw channel status bytes with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStatus {
    bytes: Bytes,
}

impl ChannelStatus {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// A zeroed block of [`FULL_STATUS_SIZE`] bytes with format byte `1`.
    pub fn blank() -> Self {
        let mut bytes = vec![0u8; FULL_STATUS_SIZE];
        bytes[0] = 1;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> Option<u8> {
        self.bytes.first().copied()
    }

    /// Flag value, or `None` if the block is too short to carry it.
    pub fn flag(&self, flag: StatusFlag) -> Option<bool> {
        let (byte, bit) = flag.position();
        self.bytes.get(byte).map(|b| (b >> bit) & 1 == 1)
    }

    /// Flags that are set, in table order.
    pub fn active_flags(&self) -> Vec<StatusFlag> {
        StatusFlag::ALL
            .into_iter()
            .filter(|flag| self.flag(*flag) == Some(true))
            .collect()
    }

    pub fn set_flag(&mut self, flag: StatusFlag, value: bool) -> Result<()> {
        let (byte, bit) = flag.position();
        self.modify(byte, 1, "status flag", |bytes| {
            bytes[0] = (bytes[0] & !(1 << bit)) | (u8::from(value) << bit);
        })
    }

    pub fn last_gps_sync(&self) -> Option<Result<DateTime<Utc>>> {
        let raw = self
            .bytes
            .get(GPS_SYNC_OFFSET..GPS_SYNC_OFFSET + TIMESTAMP_LEN)?;
        if raw.iter().all(|b| *b == 0) {
            return None;
        }
        Some(parse_timestamp(&String::from_utf8_lossy(raw)))
    }

    pub fn set_last_gps_sync(&mut self, value: &DateTime<Utc>) -> Result<()> {
        let text = format_timestamp(value)?;
        self.modify(GPS_SYNC_OFFSET, TIMESTAMP_LEN, "last gps sync", |bytes| {
            bytes.copy_from_slice(text.as_bytes());
        })
    }

    /// Clock differential in microseconds.
    pub fn clock_differential(&self) -> Option<i32> {
        let raw = self
            .bytes
            .get(CLOCK_DIFFERENTIAL_OFFSET..CLOCK_DIFFERENTIAL_OFFSET + 4)?;
        Some(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn set_clock_differential(&mut self, micros: i32) -> Result<()> {
        self.modify(CLOCK_DIFFERENTIAL_OFFSET, 4, "clock differential", |bytes| {
            bytes.copy_from_slice(&micros.to_be_bytes());
        })
    }

    fn modify(
        &mut self,
        offset: usize,
        len: usize,
        field: &'static str,
        f: impl FnOnce(&mut [u8]),
    ) -> Result<()> {
        if offset + len > self.bytes.len() {
            return Err(FrameError::malformed(
                field,
                format!(
                    "status block is {} bytes, field needs {}",
                    self.bytes.len(),
                    offset + len
                ),
            ));
        }
        let mut bytes = BytesMut::from(self.bytes.as_ref());
        f(&mut bytes[offset..offset + len]);
        self.bytes = bytes.freeze();
        Ok(())
    }
}

impl From<Bytes> for ChannelStatus {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}
