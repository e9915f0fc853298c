//! Per-device command API.
//!
//! [`Jaguar`] addresses one motor controller on the bus. Every
//! configuration command is a command/ack round-trip: the controller
//! acknowledges on the command's own identifier, so each method
//! registers a receive token for that identifier *before* transmitting
//! and hands the token back for the caller to block on.
//!
//! [`Broadcast`] carries the bus-wide system commands (heartbeat,
//! resume, halt), which are fire-and-forget and never acknowledged.

use std::sync::Arc;

use jaguar_can::CanMessage;
use jaguar_driver::{JaguarBridge, RecvToken};
use jaguar_protocol::fixed_point::{f64_to_s16p16, s8p8_to_f64, s16p16_to_f64};
use jaguar_protocol::ids::{
    ApiClass, DeviceType, Manufacturer, configuration, pack_api, pack_id, periodic_status,
    position_control, speed_control, system_control,
};
use tracing::warn;

use crate::error::ClientError;
use crate::settings::BrakeMode;

/// Feedback source for the closed speed loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedReference {
    Encoder = 0,
    InverseEncoder = 2,
    QuadratureEncoder = 3,
}

/// Feedback source for position reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionReference {
    QuadratureEncoder = 0,
    Potentiometer = 1,
}

/// One decoded diagnostics telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticsFrame {
    pub limits: u8,
    pub faults: u8,
    pub bus_voltage: f64,
    pub temperature: f64,
}

/// Byte selectors for periodic-status payload layout configuration.
mod status_byte {
    pub const END: u8 = 0x00;
    pub const POSITION: [u8; 4] = [0x01, 0x02, 0x03, 0x04];
    pub const SPEED: [u8; 4] = [0x05, 0x06, 0x07, 0x08];
    pub const LIMITS: u8 = 0x09;
    pub const FAULTS: u8 = 0x0A;
    pub const BUS_VOLTAGE: [u8; 2] = [0x0B, 0x0C];
    pub const TEMPERATURE: [u8; 2] = [0x0D, 0x0E];
}

/// Position + speed, both s16.16.
const ODOMETRY_LAYOUT: [u8; 8] = [
    status_byte::POSITION[0],
    status_byte::POSITION[1],
    status_byte::POSITION[2],
    status_byte::POSITION[3],
    status_byte::SPEED[0],
    status_byte::SPEED[1],
    status_byte::SPEED[2],
    status_byte::SPEED[3],
];

/// Limit/fault flags, bus voltage and temperature (both s8.8).
const DIAGNOSTICS_LAYOUT: [u8; 8] = [
    status_byte::LIMITS,
    status_byte::FAULTS,
    status_byte::BUS_VOLTAGE[0],
    status_byte::BUS_VOLTAGE[1],
    status_byte::TEMPERATURE[0],
    status_byte::TEMPERATURE[1],
    status_byte::END,
    status_byte::END,
];

/// Handle to one motor controller.
pub struct Jaguar {
    bridge: Arc<JaguarBridge>,
    num: u8,
}

impl Jaguar {
    /// Address device `device_number` (1-63) through the bridge.
    pub fn new(bridge: Arc<JaguarBridge>, device_number: u8) -> Result<Self, ClientError> {
        if !(1..=63).contains(&device_number) {
            return Err(ClientError::Config(format!(
                "device number {device_number} outside 1-63"
            )));
        }
        Ok(Self {
            bridge,
            num: device_number,
        })
    }

    pub fn device_number(&self) -> u8 {
        self.num
    }

    fn message_id(&self, class: ApiClass, index: u8) -> u32 {
        pack_id(
            self.num,
            Manufacturer::TexasInstruments,
            DeviceType::MotorController,
            pack_api(class, index),
        )
    }

    /// Register the ack expectation, then transmit the command.
    fn command_ack(&self, class: ApiClass, index: u8, payload: &[u8]) -> Result<RecvToken, ClientError> {
        let id = self.message_id(class, index);
        let token = self.bridge.recv(id, 0)?;
        self.bridge.send(&CanMessage::new(id, payload))?;
        Ok(token)
    }

    pub fn speed_enable(&self) -> Result<RecvToken, ClientError> {
        self.command_ack(ApiClass::SpeedControl, speed_control::MODE_ENABLE, &[])
    }

    pub fn speed_disable(&self) -> Result<RecvToken, ClientError> {
        self.command_ack(ApiClass::SpeedControl, speed_control::MODE_DISABLE, &[])
    }

    /// Command a closed-loop speed setpoint in RPM.
    pub fn speed_set(&self, rpm: f64) -> Result<RecvToken, ClientError> {
        let raw = f64_to_s16p16(rpm);
        self.command_ack(ApiClass::SpeedControl, speed_control::SET, &raw.to_le_bytes())
    }

    pub fn speed_set_p(&self, gain: f64) -> Result<RecvToken, ClientError> {
        let raw = f64_to_s16p16(gain);
        self.command_ack(
            ApiClass::SpeedControl,
            speed_control::PROPORTIONAL,
            &raw.to_le_bytes(),
        )
    }

    pub fn speed_set_i(&self, gain: f64) -> Result<RecvToken, ClientError> {
        let raw = f64_to_s16p16(gain);
        self.command_ack(
            ApiClass::SpeedControl,
            speed_control::INTEGRAL,
            &raw.to_le_bytes(),
        )
    }

    pub fn speed_set_d(&self, gain: f64) -> Result<RecvToken, ClientError> {
        let raw = f64_to_s16p16(gain);
        self.command_ack(
            ApiClass::SpeedControl,
            speed_control::DIFFERENTIAL,
            &raw.to_le_bytes(),
        )
    }

    pub fn speed_set_reference(&self, reference: SpeedReference) -> Result<RecvToken, ClientError> {
        self.command_ack(
            ApiClass::SpeedControl,
            speed_control::REFERENCE,
            &[reference as u8],
        )
    }

    pub fn position_set_reference(
        &self,
        reference: PositionReference,
    ) -> Result<RecvToken, ClientError> {
        self.command_ack(
            ApiClass::PositionControl,
            position_control::REFERENCE,
            &[reference as u8],
        )
    }

    pub fn config_encoder_lines(&self, lines: u16) -> Result<RecvToken, ClientError> {
        self.command_ack(
            ApiClass::Configuration,
            configuration::ENCODER_LINES,
            &lines.to_le_bytes(),
        )
    }

    pub fn config_brake_set(&self, mode: BrakeMode) -> Result<RecvToken, ClientError> {
        self.command_ack(
            ApiClass::Configuration,
            configuration::BRAKE_COAST,
            &[mode.wire_value()],
        )
    }

    fn check_slot(slot: u8) -> Result<(), ClientError> {
        if slot >= periodic_status::SLOTS {
            return Err(ClientError::Config(format!(
                "periodic status slot {slot} outside 0-{}",
                periodic_status::SLOTS - 1
            )));
        }
        Ok(())
    }

    /// Start periodic transmission of `slot` every `period_ms`.
    pub fn periodic_enable(&self, slot: u8, period_ms: u16) -> Result<RecvToken, ClientError> {
        Self::check_slot(slot)?;
        self.command_ack(
            ApiClass::PeriodicStatus,
            periodic_status::ENABLE_BASE + slot,
            &period_ms.to_le_bytes(),
        )
    }

    fn periodic_configure(&self, slot: u8, layout: &[u8; 8]) -> Result<RecvToken, ClientError> {
        Self::check_slot(slot)?;
        self.command_ack(
            ApiClass::PeriodicStatus,
            periodic_status::CONFIGURE_BASE + slot,
            layout,
        )
    }

    /// Configure `slot` to carry position + speed telemetry.
    pub fn periodic_configure_odometry(&self, slot: u8) -> Result<RecvToken, ClientError> {
        self.periodic_configure(slot, &ODOMETRY_LAYOUT)
    }

    /// Configure `slot` to carry limit/fault/voltage/temperature telemetry.
    pub fn periodic_configure_diagnostics(&self, slot: u8) -> Result<RecvToken, ClientError> {
        self.periodic_configure(slot, &DIAGNOSTICS_LAYOUT)
    }

    /// The identifier `slot`'s unsolicited telemetry arrives on.
    pub fn periodic_status_id(&self, slot: u8) -> u32 {
        self.message_id(
            ApiClass::PeriodicStatus,
            periodic_status::STATUS_BASE + slot,
        )
    }

    /// Decode odometry telemetry from `slot` into revolutions + RPM.
    /// Register once; subscriptions are never removed.
    pub fn on_periodic_odometry<F>(&self, slot: u8, callback: F) -> Result<(), ClientError>
    where
        F: Fn(f64, f64) + Send + Sync + 'static,
    {
        Self::check_slot(slot)?;
        let device = self.num;
        self.bridge.subscribe(self.periodic_status_id(slot), move |msg| {
            if msg.len < 8 {
                warn!(device, len = msg.len, "undersized odometry telemetry ignored");
                return;
            }
            let position = s16p16_to_f64(i32::from_le_bytes([
                msg.data[0], msg.data[1], msg.data[2], msg.data[3],
            ]));
            let speed = s16p16_to_f64(i32::from_le_bytes([
                msg.data[4], msg.data[5], msg.data[6], msg.data[7],
            ]));
            callback(position, speed);
        });
        Ok(())
    }

    /// Decode diagnostics telemetry from `slot`.
    /// Register once; subscriptions are never removed.
    pub fn on_periodic_diagnostics<F>(&self, slot: u8, callback: F) -> Result<(), ClientError>
    where
        F: Fn(DiagnosticsFrame) + Send + Sync + 'static,
    {
        Self::check_slot(slot)?;
        let device = self.num;
        self.bridge.subscribe(self.periodic_status_id(slot), move |msg| {
            if msg.len < 6 {
                warn!(device, len = msg.len, "undersized diagnostics telemetry ignored");
                return;
            }
            callback(DiagnosticsFrame {
                limits: msg.data[0],
                faults: msg.data[1],
                bus_voltage: s8p8_to_f64(i16::from_le_bytes([msg.data[2], msg.data[3]])),
                temperature: s8p8_to_f64(i16::from_le_bytes([msg.data[4], msg.data[5]])),
            });
        });
        Ok(())
    }
}

/// Bus-wide system commands (device and manufacturer fields zero).
pub struct Broadcast {
    bridge: Arc<JaguarBridge>,
}

impl Broadcast {
    pub fn new(bridge: Arc<JaguarBridge>) -> Self {
        Self { bridge }
    }

    fn send(&self, api: u16) -> Result<(), ClientError> {
        let id = pack_id(0, Manufacturer::Broadcast, DeviceType::Broadcast, api);
        self.bridge.send(&CanMessage::new(id, &[]))?;
        Ok(())
    }

    /// Keep-alive. Controllers safety-stop when this lapses.
    pub fn heartbeat(&self) -> Result<(), ClientError> {
        self.send(system_control::HEARTBEAT)
    }

    pub fn system_resume(&self) -> Result<(), ClientError> {
        self.send(system_control::RESUME)
    }

    pub fn system_halt(&self) -> Result<(), ClientError> {
        self.send(system_control::HALT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaguar_can::mock::{MockSerialAdapter, MockSerialHost};
    use jaguar_protocol::framing::{Decoded, FrameDecoder, encode_frame};
    use std::time::Duration;

    fn setup() -> (Arc<JaguarBridge>, MockSerialHost) {
        let (adapter, host) = MockSerialAdapter::pair();
        (Arc::new(JaguarBridge::new(adapter).unwrap()), host)
    }

    fn decode_one(wire: &[u8]) -> CanMessage {
        let mut decoder = FrameDecoder::new();
        for &b in wire {
            if let Decoded::Message(m) = decoder.push_byte(b) {
                return m;
            }
        }
        panic!("no complete frame in {wire:02x?}");
    }

    #[test]
    fn device_number_bounds() {
        let (bridge, _host) = setup();
        assert!(Jaguar::new(Arc::clone(&bridge), 0).is_err());
        assert!(Jaguar::new(Arc::clone(&bridge), 64).is_err());
        assert!(Jaguar::new(bridge, 63).is_ok());
    }

    #[test]
    fn speed_set_encodes_fixed_point_setpoint() {
        let (bridge, host) = setup();
        let jag = Jaguar::new(Arc::clone(&bridge), 5).unwrap();
        let _token = jag.speed_set(120.5).unwrap();

        let wire = host.recv_written(Duration::from_secs(1)).unwrap();
        let msg = decode_one(&wire);
        assert_eq!(
            msg.id,
            pack_id(
                5,
                Manufacturer::TexasInstruments,
                DeviceType::MotorController,
                pack_api(ApiClass::SpeedControl, speed_control::SET),
            )
        );
        assert_eq!(msg.payload(), f64_to_s16p16(120.5).to_le_bytes().as_slice());
    }

    #[test]
    fn gain_setters_use_distinct_commands() {
        let (bridge, host) = setup();
        let jag = Jaguar::new(Arc::clone(&bridge), 3).unwrap();
        let _p = jag.speed_set_p(1.0).unwrap();
        let _i = jag.speed_set_i(1.0).unwrap();
        let _d = jag.speed_set_d(1.0).unwrap();

        let mut indices = Vec::new();
        for _ in 0..3 {
            let wire = host.recv_written(Duration::from_secs(1)).unwrap();
            let id = jaguar_protocol::ids::CanId::from_raw(decode_one(&wire).id);
            indices.push(id.api_index().value());
        }
        assert_eq!(
            indices,
            vec![
                speed_control::PROPORTIONAL,
                speed_control::INTEGRAL,
                speed_control::DIFFERENTIAL
            ]
        );
    }

    #[test]
    fn command_ack_round_trip() {
        let (bridge, host) = setup();
        let jag = Jaguar::new(Arc::clone(&bridge), 2).unwrap();
        let token = jag.speed_enable().unwrap();

        // Echo an ack on the command's own identifier.
        let wire = host.recv_written(Duration::from_secs(1)).unwrap();
        let cmd = decode_one(&wire);
        host.inject(&encode_frame(&CanMessage::new(cmd.id, &[])));

        assert!(token.block_for(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn periodic_slot_bounds_checked() {
        let (bridge, _host) = setup();
        let jag = Jaguar::new(bridge, 2).unwrap();
        assert!(matches!(
            jag.periodic_enable(4, 100),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn odometry_telemetry_is_decoded() {
        let (bridge, host) = setup();
        let jag = Jaguar::new(Arc::clone(&bridge), 7).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        jag.on_periodic_odometry(0, move |pos, speed| {
            let _ = tx.send((pos, speed));
        })
        .unwrap();

        let mut payload = Vec::new();
        payload.extend_from_slice(&f64_to_s16p16(2.5).to_le_bytes());
        payload.extend_from_slice(&f64_to_s16p16(90.0).to_le_bytes());
        host.inject(&encode_frame(&CanMessage::new(jag.periodic_status_id(0), &payload)));

        let (pos, speed) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(pos, 2.5);
        assert_eq!(speed, 90.0);
    }

    #[test]
    fn diagnostics_telemetry_is_decoded() {
        let (bridge, host) = setup();
        let jag = Jaguar::new(Arc::clone(&bridge), 7).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        jag.on_periodic_diagnostics(1, move |frame| {
            let _ = tx.send(frame);
        })
        .unwrap();

        let mut payload = vec![0x03, 0x10];
        payload.extend_from_slice(&jaguar_protocol::fixed_point::f64_to_s8p8(12.5).to_le_bytes());
        payload.extend_from_slice(&jaguar_protocol::fixed_point::f64_to_s8p8(30.25).to_le_bytes());
        host.inject(&encode_frame(&CanMessage::new(jag.periodic_status_id(1), &payload)));

        let frame = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.limits, 0x03);
        assert_eq!(frame.faults, 0x10);
        assert_eq!(frame.bus_voltage, 12.5);
        assert_eq!(frame.temperature, 30.25);
    }

    #[test]
    fn broadcast_heartbeat_uses_system_id() {
        let (bridge, host) = setup();
        let broadcast = Broadcast::new(bridge);
        broadcast.heartbeat().unwrap();

        let wire = host.recv_written(Duration::from_secs(1)).unwrap();
        let msg = decode_one(&wire);
        assert_eq!(
            msg.id,
            pack_id(0, Manufacturer::Broadcast, DeviceType::Broadcast, system_control::HEARTBEAT)
        );
        assert!(msg.payload().is_empty());
    }
}
