//! Driver layer error types.

use jaguar_can::CanError;
use jaguar_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the bridge and its tokens.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Transport failure; never retried at this layer.
    #[error("CAN transport error: {0}")]
    Can(#[from] CanError),

    /// Malformed message construction.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A receive token for this identifier is already outstanding.
    /// Registering a second one is a caller contract violation.
    #[error("a receive token is already pending for id {id:#010x}")]
    TokenPending { id: u32 },

    /// The reply carried fewer bytes than the registered destination
    /// expected.
    #[error("reply for id {id:#010x} was {actual} bytes, expected {expected}")]
    LengthMismatch { id: u32, expected: usize, actual: usize },

    /// A bounded wait elapsed before the expected message arrived.
    /// The token remains pending and the wait may be retried.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// A lock was poisoned by a panicking thread.
    #[error("poisoned lock (a bridge thread panicked)")]
    PoisonedLock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_identifiers() {
        let err = DriverError::TokenPending { id: 0x0205_1042 };
        assert!(err.to_string().contains("0x02051042"));

        let err = DriverError::LengthMismatch {
            id: 0x40,
            expected: 8,
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains('8') && msg.contains('2'));
    }

    #[test]
    fn from_can_error() {
        let err: DriverError = CanError::BusOff.into();
        assert!(matches!(err, DriverError::Can(CanError::BusOff)));
    }

    #[test]
    fn from_protocol_error() {
        let err: DriverError = ProtocolError::PayloadTooLong { len: 9 }.into();
        assert!(matches!(err, DriverError::Protocol(_)));
    }
}
