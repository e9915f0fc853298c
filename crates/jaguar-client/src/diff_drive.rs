//! Differential-drive controller and estimator.
//!
//! [`DiffDriveRobot`] owns the two wheel controllers, converts body
//! velocity commands into per-wheel speed setpoints, keeps the
//! keep-alive broadcast running, and fuses the wheels' periodic encoder
//! telemetry into a pose estimate.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jaguar_driver::{JaguarBridge, RecvToken};
use tracing::info;

use crate::device::{Broadcast, DiagnosticsFrame, Jaguar, PositionReference, SpeedReference};
use crate::error::ClientError;
use crate::heartbeat::HeartbeatManager;
use crate::odometry::{OdometryEstimator, OdometryReport, Pose, Side};
use crate::ramp::SpeedRamp;
use crate::settings::{BrakeMode, DriveSettings};

/// Periodic-status slot carrying position/velocity telemetry.
const ODOMETRY_SLOT: u8 = 0;
/// Periodic-status slot carrying diagnostics telemetry.
const DIAGNOSTICS_SLOT: u8 = 1;
/// How long each configuration step may wait for its ack.
const ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Convert a body velocity command into per-wheel linear speeds.
/// `robot_radius` is half the track width.
pub fn wheel_speeds(v: f64, omega: f64, robot_radius: f64) -> (f64, f64) {
    (v - robot_radius * omega, v + robot_radius * omega)
}

/// Convert a wheel's linear speed to rotational RPM.
pub fn mps_to_rpm(v: f64, wheel_circum: f64) -> f64 {
    v * 60.0 / wheel_circum
}

/// Latest health snapshot for one wheel controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelDiagnostics {
    /// Both limit switches released the output.
    pub stopped: bool,
    pub faults: u8,
    pub bus_voltage: f64,
    pub temperature: f64,
}

impl From<DiagnosticsFrame> for WheelDiagnostics {
    fn from(frame: DiagnosticsFrame) -> Self {
        Self {
            stopped: frame.limits & 0x03 == 0,
            faults: frame.faults,
            bus_voltage: frame.bus_voltage,
            temperature: frame.temperature,
        }
    }
}

fn recover<'a, T>(guard: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    guard.unwrap_or_else(PoisonError::into_inner)
}

/// A two-wheel differential-drive robot on one bridge.
pub struct DiffDriveRobot {
    bridge: Arc<JaguarBridge>,
    broadcast: Broadcast,
    left: Jaguar,
    right: Jaguar,
    settings: DriveSettings,
    wheel_circum: f64,
    ramp: SpeedRamp,
    target_rpm: [f64; 2],
    current_rpm: [f64; 2],
    odometry: Arc<OdometryEstimator>,
    diagnostics: [Arc<Mutex<WheelDiagnostics>>; 2],
    heartbeat: Option<HeartbeatManager>,
}

impl DiffDriveRobot {
    /// Wire up telemetry, run the bring-up sequence and start the
    /// heartbeat. Blocks until every configuration step acknowledges,
    /// surfacing the first failure.
    pub fn new(bridge: Arc<JaguarBridge>, settings: DriveSettings) -> Result<Self, ClientError> {
        settings.validate().map_err(ClientError::Config)?;

        let left = Jaguar::new(Arc::clone(&bridge), settings.left_id)?;
        let right = Jaguar::new(Arc::clone(&bridge), settings.right_id)?;
        let broadcast = Broadcast::new(Arc::clone(&bridge));
        let wheel_circum = settings.wheel_circumference();
        let ramp = SpeedRamp::new(mps_to_rpm(settings.accel_max_mps2, wheel_circum));
        let odometry = Arc::new(OdometryEstimator::new(wheel_circum, settings.robot_radius_m));
        let diagnostics = [
            Arc::new(Mutex::new(WheelDiagnostics::default())),
            Arc::new(Mutex::new(WheelDiagnostics::default())),
        ];

        // Subscriptions are registered exactly once, here, so that
        // re-running `init` after a controller reboot stays idempotent.
        for (device, side) in [(&left, Side::Left), (&right, Side::Right)] {
            let odometry = Arc::clone(&odometry);
            device.on_periodic_odometry(ODOMETRY_SLOT, move |position, speed| {
                odometry.update(side, position, speed);
            })?;

            let slot = Arc::clone(&diagnostics[side as usize]);
            device.on_periodic_diagnostics(DIAGNOSTICS_SLOT, move |frame| {
                *recover(slot.lock()) = WheelDiagnostics::from(frame);
            })?;
        }

        let mut robot = Self {
            bridge,
            broadcast,
            left,
            right,
            settings,
            wheel_circum,
            ramp,
            target_rpm: [0.0; 2],
            current_rpm: [0.0; 2],
            odometry,
            diagnostics,
            heartbeat: None,
        };
        robot.init()?;
        Ok(robot)
    }

    fn ack_pair(step: &'static str, left: RecvToken, right: RecvToken) -> Result<(), ClientError> {
        for token in [left, right] {
            token
                .block_for(ACK_TIMEOUT)
                .map_err(|source| ClientError::Ack { step, source })?;
        }
        Ok(())
    }

    /// Bring both controllers to a known configuration. Required after
    /// any power cycle, even an uncommanded one, and safe to repeat.
    pub fn init(&mut self) -> Result<(), ClientError> {
        let s = &self.settings;

        Self::ack_pair(
            "brake-config",
            self.left.config_brake_set(s.brake_mode)?,
            self.right.config_brake_set(s.brake_mode)?,
        )?;

        // The encoder feeds both the speed loop and position reporting,
        // so it must be selected as the position reference even though
        // the wheels run in speed mode.
        Self::ack_pair(
            "position-reference",
            self.left.position_set_reference(PositionReference::QuadratureEncoder)?,
            self.right.position_set_reference(PositionReference::QuadratureEncoder)?,
        )?;
        Self::ack_pair(
            "encoder-lines",
            self.left.config_encoder_lines(s.ticks_per_rev)?,
            self.right.config_encoder_lines(s.ticks_per_rev)?,
        )?;

        Self::ack_pair(
            "speed-reference",
            self.left.speed_set_reference(SpeedReference::QuadratureEncoder)?,
            self.right.speed_set_reference(SpeedReference::QuadratureEncoder)?,
        )?;
        Self::ack_pair(
            "speed-gain-p",
            self.left.speed_set_p(s.gains.p)?,
            self.right.speed_set_p(s.gains.p)?,
        )?;
        Self::ack_pair(
            "speed-gain-i",
            self.left.speed_set_i(s.gains.i)?,
            self.right.speed_set_i(s.gains.i)?,
        )?;
        Self::ack_pair(
            "speed-gain-d",
            self.left.speed_set_d(s.gains.d)?,
            self.right.speed_set_d(s.gains.d)?,
        )?;
        Self::ack_pair(
            "speed-enable",
            self.left.speed_enable()?,
            self.right.speed_enable()?,
        )?;

        Self::ack_pair(
            "odometry-config",
            self.left.periodic_configure_odometry(ODOMETRY_SLOT)?,
            self.right.periodic_configure_odometry(ODOMETRY_SLOT)?,
        )?;
        Self::ack_pair(
            "odometry-enable",
            self.left.periodic_enable(ODOMETRY_SLOT, s.status_period_ms)?,
            self.right.periodic_enable(ODOMETRY_SLOT, s.status_period_ms)?,
        )?;
        Self::ack_pair(
            "diagnostics-config",
            self.left.periodic_configure_diagnostics(DIAGNOSTICS_SLOT)?,
            self.right.periodic_configure_diagnostics(DIAGNOSTICS_SLOT)?,
        )?;
        Self::ack_pair(
            "diagnostics-enable",
            self.left.periodic_enable(DIAGNOSTICS_SLOT, s.diag_period_ms)?,
            self.right.periodic_enable(DIAGNOSTICS_SLOT, s.diag_period_ms)?,
        )?;

        self.broadcast.system_resume()?;

        if self.heartbeat.is_none() {
            self.heartbeat = Some(HeartbeatManager::start(
                Arc::clone(&self.bridge),
                Duration::from_millis(s.heartbeat_period_ms),
            ));
        }

        info!(
            left = s.left_id,
            right = s.right_id,
            "drive controllers configured and resumed"
        );
        Ok(())
    }

    /// Set body velocity targets: forward `v` (m/s) and turn rate
    /// `omega` (rad/s). Takes effect on the next [`drive_spin`] tick.
    ///
    /// [`drive_spin`]: DiffDriveRobot::drive_spin
    pub fn drive(&mut self, v: f64, omega: f64) {
        let (v_left, v_right) = wheel_speeds(v, omega, self.settings.robot_radius_m);
        self.drive_raw(v_left, v_right);
    }

    /// Set per-wheel linear speed targets directly (m/s).
    pub fn drive_raw(&mut self, v_left: f64, v_right: f64) {
        self.target_rpm[0] = mps_to_rpm(v_left, self.wheel_circum);
        self.target_rpm[1] = mps_to_rpm(v_right, self.wheel_circum);
    }

    /// One control tick: ramp the commanded speeds toward the targets
    /// and transmit the setpoints, waiting for both acks.
    pub fn drive_spin(&mut self, dt: f64) -> Result<(), ClientError> {
        self.current_rpm[0] = self.ramp.step(self.current_rpm[0], self.target_rpm[0], dt);
        self.current_rpm[1] = self.ramp.step(self.current_rpm[1], self.target_rpm[1], dt);
        Self::ack_pair(
            "speed-set",
            self.left.speed_set(self.current_rpm[0])?,
            self.right.speed_set(self.current_rpm[1])?,
        )
    }

    /// Override brake/coast behavior on both wheels.
    pub fn drive_brake(&mut self, braking: bool) -> Result<(), ClientError> {
        let mode = if braking {
            BrakeMode::OverrideBrake
        } else {
            BrakeMode::OverrideCoast
        };
        Self::ack_pair(
            "brake-override",
            self.left.config_brake_set(mode)?,
            self.right.config_brake_set(mode)?,
        )
    }

    /// Commanded per-wheel speeds after ramping, RPM.
    pub fn commanded_rpm(&self) -> (f64, f64) {
        (self.current_rpm[0], self.current_rpm[1])
    }

    /// Register an observer for fused odometry updates.
    pub fn odom_attach<F>(&self, observer: F)
    where
        F: Fn(&OdometryReport) + Send + 'static,
    {
        self.odometry.attach(observer);
    }

    /// Most recent fused odometry report (wait-free).
    pub fn latest_odometry(&self) -> OdometryReport {
        self.odometry.latest()
    }

    pub fn pose(&self) -> Pose {
        self.odometry.pose()
    }

    /// Latest per-wheel diagnostics: `(left, right)`.
    pub fn diagnostics(&self) -> (WheelDiagnostics, WheelDiagnostics) {
        (
            *recover(self.diagnostics[0].lock()),
            *recover(self.diagnostics[1].lock()),
        )
    }
}
