//! # Jaguar bridge driver
//!
//! The dispatch core of the SDK. [`JaguarBridge`] owns a dedicated
//! receive thread that frames the transport's byte stream into
//! [`CanMessage`]s and routes each one to at most one pending
//! [`RecvToken`] and to every subscriber registered for its identifier.
//!
//! ```no_run
//! use jaguar_can::mock::MockSerialAdapter;
//! use jaguar_driver::JaguarBridge;
//! use jaguar_protocol::CanMessage;
//!
//! # fn main() -> Result<(), jaguar_driver::DriverError> {
//! let (adapter, _host) = MockSerialAdapter::pair();
//! let bridge = JaguarBridge::new(adapter)?;
//!
//! // Expect a reply on id 0x0205_1042, then issue the command.
//! let token = bridge.recv(0x0205_1042, 0)?;
//! bridge.send(&CanMessage::new(0x0205_1042, &[0x10, 0x00, 0x00, 0x00]))?;
//! let _ack = token.block_for(std::time::Duration::from_millis(500))?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod error;
pub mod metrics;
pub mod token;

pub use bridge::JaguarBridge;
pub use error::DriverError;
pub use jaguar_protocol::CanMessage;
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use token::RecvToken;
