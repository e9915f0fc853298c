//! # Jaguar client layer
//!
//! High-level API over the bridge: the per-device command surface
//! ([`Jaguar`], [`Broadcast`]) and the differential-drive
//! controller/estimator ([`DiffDriveRobot`]), which converts body
//! velocity commands into per-wheel setpoints and fuses encoder
//! telemetry into a pose estimate.
//!
//! ```no_run
//! use std::sync::Arc;
//! use jaguar_can::mock::MockSerialAdapter;
//! use jaguar_client::{DiffDriveRobot, DriveSettings};
//! use jaguar_driver::JaguarBridge;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (adapter, _host) = MockSerialAdapter::pair();
//! let bridge = Arc::new(JaguarBridge::new(adapter)?);
//! let mut robot = DiffDriveRobot::new(bridge, DriveSettings::default())?;
//!
//! robot.drive(0.5, 0.0); // 0.5 m/s straight ahead
//! robot.drive_spin(0.02)?; // one 50 Hz control tick
//! println!("pose: {:?}", robot.pose());
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod diff_drive;
pub mod error;
pub mod heartbeat;
pub mod odometry;
pub mod ramp;
pub mod settings;

pub use device::{Broadcast, DiagnosticsFrame, Jaguar, PositionReference, SpeedReference};
pub use diff_drive::{DiffDriveRobot, WheelDiagnostics, mps_to_rpm, wheel_speeds};
pub use error::ClientError;
pub use heartbeat::HeartbeatManager;
pub use odometry::{OdometryEstimator, OdometryReport, Pose, Side};
pub use ramp::SpeedRamp;
pub use settings::{BrakeMode, DriveSettings, PidGains};
