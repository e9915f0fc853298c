//! # Jaguar transport layer
//!
//! Abstraction over the byte stream that carries framed CAN traffic
//! between the host and the bridge hardware. The bridge core only ever
//! talks to the traits defined here; concrete backends are the raw
//! serial port ([`tty`], Linux) and the channel-backed [`mock`] adapter
//! used by tests.
//!
//! An adapter can be [split](SplittableAdapter) into independent receive
//! and transmit halves so a dedicated receive thread can own the inbound
//! stream while senders share the outbound one.

use std::time::Duration;

use thiserror::Error;

pub use jaguar_protocol::CanMessage;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(all(feature = "tty", target_os = "linux"))]
pub mod tty;

/// Transport failure taxonomy.
///
/// Every variant is a distinct condition the core propagates to its
/// caller; none of them is retried at this layer.
#[derive(Error, Debug)]
pub enum CanError {
    /// Underlying OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device driver or firmware version is not one this library
    /// can talk to.
    #[error("incompatible device driver or firmware version")]
    IncompatibleDriver,

    /// The controller went bus-off after an error-frame storm.
    #[error("controller is off the bus (error-frame storm)")]
    BusOff,

    /// Transmit did not complete within the transport's window.
    #[error("transmit timeout exceeded")]
    SendTimeout,

    /// Nothing arrived within the configured receive window. Expected
    /// during normal polling; the receive loop treats it as a tick.
    #[error("receive timeout exceeded")]
    ReceiveTimeout,

    /// The peer end of the transport is gone.
    #[error("transport disconnected")]
    Disconnected,
}

impl CanError {
    /// Whether the receive path may simply poll again after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, CanError::ReceiveTimeout)
    }
}

/// A bidirectional byte-stream transport.
pub trait SerialAdapter {
    /// Read available bytes, blocking up to the configured timeout.
    /// Returns [`CanError::ReceiveTimeout`] when nothing arrived.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CanError>;

    /// Write all bytes of one encoded frame.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CanError>;

    /// Bound how long `read` may block. Backends that cannot adjust the
    /// window at runtime may ignore this.
    fn set_read_timeout(&mut self, _timeout: Duration) {}
}

/// Receive half of a split adapter; owned by the receive thread.
pub trait RxAdapter: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CanError>;
    fn set_read_timeout(&mut self, _timeout: Duration) {}
}

/// Transmit half of a split adapter; shared behind a lock by senders.
pub trait TxAdapter: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CanError>;
}

/// Adapter that can be separated into independent Rx and Tx halves.
///
/// Splitting consumes the adapter: afterwards the receive thread owns
/// the Rx half exclusively and senders share the Tx half.
pub trait SplittableAdapter: SerialAdapter {
    type Rx: RxAdapter + 'static;
    type Tx: TxAdapter + 'static;

    fn split(self) -> Result<(Self::Rx, Self::Tx), CanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_timeout_is_transient() {
        assert!(CanError::ReceiveTimeout.is_transient());
        assert!(!CanError::BusOff.is_transient());
        assert!(!CanError::SendTimeout.is_transient());
        assert!(!CanError::Disconnected.is_transient());
    }

    #[test]
    fn error_display() {
        assert!(CanError::IncompatibleDriver.to_string().contains("ncompatible"));
        assert!(CanError::BusOff.to_string().contains("bus"));
        let io = CanError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(io.to_string().contains("boom"));
    }
}
