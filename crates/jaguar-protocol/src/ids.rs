//! Structured CAN identifier model.
//!
//! A Jaguar identifier packs five fields into the 29-bit extended CAN id,
//! least-significant first: device number (6 bits), API index (4 bits),
//! API class (6 bits), manufacturer (8 bits) and device type (5 bits).
//!
//! Two raw encodings of the same identifier circulate: the canonical
//! host-order integer used everywhere in memory, and the little-endian
//! byte order the serial bridge puts on the wire. Some firmware revisions
//! log identifiers big-endian instead, so both conversions are explicit
//! ([`CanId::from_wire_le`] / [`CanId::from_wire_be`]) and the caller
//! always picks one; nothing here guesses.

use std::fmt;

use bilge::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Packed 29-bit identifier. Fields are declared LSB-first.
#[bitsize(29)]
#[derive(FromBits, DebugBits, PartialEq, Eq, Clone, Copy)]
pub struct CanId {
    device_number: u6,
    pub api_index: u4,
    api_class: u6,
    manufacturer: u8,
    device_type: u5,
}

impl CanId {
    /// Decode from a canonical host-order integer, masking to 29 bits.
    pub fn from_raw(raw: u32) -> Self {
        Self::from(u29::new(raw & crate::ID_MASK))
    }

    /// The canonical host-order integer.
    pub fn raw(self) -> u32 {
        u29::from(self).value()
    }

    /// Decode an identifier transmitted in wire (little-endian) order.
    pub fn from_wire_le(bytes: [u8; 4]) -> Self {
        Self::from_raw(u32::from_le_bytes(bytes))
    }

    /// Decode an identifier transmitted in big-endian order.
    pub fn from_wire_be(bytes: [u8; 4]) -> Self {
        Self::from_raw(u32::from_be_bytes(bytes))
    }

    /// Encode for the wire (little-endian) order.
    pub fn to_wire_le(self) -> [u8; 4] {
        self.raw().to_le_bytes()
    }

    /// Encode in big-endian order.
    pub fn to_wire_be(self) -> [u8; 4] {
        self.raw().to_be_bytes()
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = self.device_type().value();
        let mfr = self.manufacturer();
        let class = self.api_class().value();
        match (DeviceType::try_from(dt), Manufacturer::try_from(mfr)) {
            (Ok(dt), Ok(mfr)) => write!(f, "type={dt:?} mfr={mfr:?}")?,
            _ => write!(f, "type={dt} mfr={mfr}")?,
        }
        match ApiClass::try_from(class) {
            Ok(class) => write!(f, " class={class:?}")?,
            Err(_) => write!(f, " class={class}")?,
        }
        write!(
            f,
            " index={} device={}",
            self.api_index().value(),
            self.device_number().value()
        )
    }
}

/// Pack an identifier from its fields. `api` is the combined 10-bit API
/// field (class in the upper 6 bits, index in the lower 4).
pub fn pack_id(device_number: u8, manufacturer: Manufacturer, device_type: DeviceType, api: u16) -> u32 {
    let dn = u32::from(device_number) & 0x3F;
    let api = (u32::from(api) & 0x3FF) << 6;
    let mfr = u32::from(u8::from(manufacturer)) << 16;
    let dt = u32::from(u8::from(device_type)) << 24;
    dt | mfr | api | dn
}

/// Combine an API class and index into the 10-bit API field.
pub fn pack_api(class: ApiClass, index: u8) -> u16 {
    (u16::from(u8::from(class)) << 4) | u16::from(index & 0x0F)
}

/// Device type field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DeviceType {
    Broadcast = 0,
    RobotController = 1,
    MotorController = 2,
    RelayController = 3,
    GyroSensor = 4,
    Accelerometer = 5,
    UltrasonicSensor = 6,
    GearToothSensor = 7,
    FirmwareUpdate = 31,
}

/// Manufacturer field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Manufacturer {
    Broadcast = 0,
    NationalInstruments = 1,
    TexasInstruments = 2,
    Deka = 3,
}

/// API class field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ApiClass {
    VoltageControl = 0,
    SpeedControl = 1,
    VoltageCompensation = 2,
    PositionControl = 3,
    CurrentControl = 4,
    Status = 5,
    PeriodicStatus = 6,
    Configuration = 7,
    Ack = 8,
}

/// System-control broadcast commands, sent with device type and
/// manufacturer both zero. Values are full 10-bit API fields.
pub mod system_control {
    pub const HALT: u16 = 0;
    pub const RESET: u16 = 1;
    pub const DEVICE_ASSIGNMENT: u16 = 2;
    pub const DEVICE_QUERY: u16 = 3;
    pub const HEARTBEAT: u16 = 5;
    pub const SYNC_UPDATE: u16 = 6;
    pub const FIRMWARE_VERSION: u16 = 8;
    pub const ENUMERATION: u16 = 9;
    pub const RESUME: u16 = 10;
}

/// API indices within [`ApiClass::SpeedControl`].
pub mod speed_control {
    pub const MODE_ENABLE: u8 = 0;
    pub const MODE_DISABLE: u8 = 1;
    pub const SET: u8 = 2;
    pub const PROPORTIONAL: u8 = 3;
    pub const INTEGRAL: u8 = 4;
    pub const DIFFERENTIAL: u8 = 5;
    pub const REFERENCE: u8 = 6;
}

/// API indices within [`ApiClass::PositionControl`].
pub mod position_control {
    pub const MODE_ENABLE: u8 = 0;
    pub const MODE_DISABLE: u8 = 1;
    pub const SET: u8 = 2;
    pub const PROPORTIONAL: u8 = 3;
    pub const INTEGRAL: u8 = 4;
    pub const DIFFERENTIAL: u8 = 5;
    pub const REFERENCE: u8 = 6;
}

/// API indices within [`ApiClass::Configuration`].
pub mod configuration {
    pub const BRUSHES: u8 = 0;
    pub const ENCODER_LINES: u8 = 1;
    pub const POTENTIOMETER_TURNS: u8 = 2;
    pub const BRAKE_COAST: u8 = 3;
    pub const LIMIT_MODE: u8 = 4;
    pub const FORWARD_LIMIT: u8 = 5;
    pub const REVERSE_LIMIT: u8 = 6;
    pub const MAX_VOLTAGE: u8 = 7;
    pub const FAULT_TIME: u8 = 8;
}

/// API indices within [`ApiClass::PeriodicStatus`]. A controller exposes
/// four periodic-status slots; enable, configure and the unsolicited
/// status message for slot `n` sit at `BASE + n` of each group.
pub mod periodic_status {
    pub const ENABLE_BASE: u8 = 0;
    pub const CONFIGURE_BASE: u8 = 4;
    pub const STATUS_BASE: u8 = 8;
    /// Number of periodic-status slots per controller.
    pub const SLOTS: u8 = 4;
}

/// Firmware-update (bootloader) commands, addressed to
/// [`DeviceType::FirmwareUpdate`]. Values are full 10-bit API fields.
pub mod firmware_update {
    pub const PING: u16 = 0;
    pub const DOWNLOAD: u16 = 1;
    pub const SEND_DATA: u16 = 2;
    pub const ACK: u16 = 3;
    pub const RESET: u16 = 4;
}
