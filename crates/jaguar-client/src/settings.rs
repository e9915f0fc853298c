//! Drive configuration.

use serde::{Deserialize, Serialize};

/// Brake/coast behavior applied at neutral throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeMode {
    /// Follow the hardware jumper.
    Jumper,
    OverrideBrake,
    OverrideCoast,
}

impl BrakeMode {
    /// Wire encoding of the brake/coast configuration payload.
    pub fn wire_value(self) -> u8 {
        match self {
            BrakeMode::Jumper => 0,
            BrakeMode::OverrideBrake => 1,
            BrakeMode::OverrideCoast => 2,
        }
    }
}

/// Closed-loop speed controller gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

/// Immutable drive configuration, supplied at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    /// Left wheel controller device number (1-63).
    pub left_id: u8,
    /// Right wheel controller device number (1-63).
    pub right_id: u8,
    pub wheel_radius_m: f64,
    /// Half the track width.
    pub robot_radius_m: f64,
    /// Quadrature encoder resolution.
    pub ticks_per_rev: u16,
    /// Acceleration bound for the command ramp; zero or negative
    /// disables ramping.
    pub accel_max_mps2: f64,
    /// Period of the position/velocity telemetry stream.
    pub status_period_ms: u16,
    /// Period of the diagnostics telemetry stream.
    pub diag_period_ms: u16,
    /// Period of the keep-alive broadcast. The controllers safety-stop
    /// if it lapses.
    pub heartbeat_period_ms: u64,
    pub brake_mode: BrakeMode,
    pub gains: PidGains,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            left_id: 1,
            right_id: 2,
            wheel_radius_m: 0.075,
            robot_radius_m: 0.25,
            ticks_per_rev: 800,
            accel_max_mps2: 1.5,
            status_period_ms: 200,
            diag_period_ms: 500,
            heartbeat_period_ms: 50,
            brake_mode: BrakeMode::OverrideCoast,
            gains: PidGains {
                p: 1.0,
                i: 0.01,
                d: 0.0,
            },
        }
    }
}

impl DriveSettings {
    pub fn wheel_circumference(&self) -> f64 {
        std::f64::consts::TAU * self.wheel_radius_m
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=63).contains(&self.left_id) || !(1..=63).contains(&self.right_id) {
            return Err("wheel device numbers must be 1-63".into());
        }
        if self.left_id == self.right_id {
            return Err("left and right wheels must have distinct device numbers".into());
        }
        if self.wheel_radius_m <= 0.0 || self.robot_radius_m <= 0.0 {
            return Err("wheel and robot radii must be positive".into());
        }
        if self.ticks_per_rev == 0 {
            return Err("ticks_per_rev must be nonzero".into());
        }
        if self.status_period_ms == 0 || self.diag_period_ms == 0 {
            return Err("telemetry periods must be nonzero".into());
        }
        if self.heartbeat_period_ms == 0 {
            return Err("heartbeat period must be nonzero".into());
        }
        Ok(())
    }
}
