//! # Jaguar protocol layer
//!
//! Pure data layer for the Jaguar motor-controller CAN protocol: the
//! [`CanMessage`] type, the structured 29-bit identifier model ([`ids`]),
//! the serial SOF/ESC framing codec ([`framing`]) and the s16.16
//! fixed-point helpers ([`fixed_point`]). No I/O happens here.

use thiserror::Error;

pub mod fixed_point;
pub mod framing;
pub mod ids;

/// Maximum CAN payload length in bytes.
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Mask selecting the 29 significant identifier bits.
pub const ID_MASK: u32 = 0x1FFF_FFFF;

/// Protocol layer error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload longer than the 8 bytes a CAN frame can carry.
    #[error("payload too long: {len} bytes (max {MAX_PAYLOAD_LEN})")]
    PayloadTooLong { len: usize },

    /// Identifier with bits set above the 29-bit range.
    #[error("identifier out of range: {id:#010x}")]
    IdOutOfRange { id: u32 },

    /// A field value outside its enumerated range.
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u8 },
}

/// A decoded CAN message: a 29-bit identifier plus up to 8 payload bytes.
///
/// `Copy` with fixed inline storage, so it can cross threads and sit in
/// channels without allocation. Unused payload bytes are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanMessage {
    /// Canonical host-order identifier (29 significant bits).
    pub id: u32,
    /// Payload bytes; only the first `len` are meaningful.
    pub data: [u8; MAX_PAYLOAD_LEN],
    /// Valid payload length (0-8).
    pub len: u8,
}

impl CanMessage {
    /// Build a message, masking the identifier to 29 bits and truncating
    /// the payload to 8 bytes.
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_PAYLOAD_LEN);
        let mut data = [0u8; MAX_PAYLOAD_LEN];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id: id & ID_MASK,
            data,
            len: len as u8,
        }
    }

    /// Fallible constructor that rejects oversized payloads and
    /// out-of-range identifiers instead of clipping them.
    pub fn try_new(id: u32, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong { len: payload.len() });
        }
        if id & !ID_MASK != 0 {
            return Err(ProtocolError::IdOutOfRange { id });
        }
        Ok(Self::new(id, payload))
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_truncates_and_masks() {
        let long = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let msg = CanMessage::new(0xFFFF_FFFF, &long);
        assert_eq!(msg.id, ID_MASK);
        assert_eq!(msg.len, 8);
        assert_eq!(msg.payload(), &long[..8]);
    }

    #[test]
    fn try_new_rejects_oversize() {
        let long = [0u8; 9];
        assert_eq!(
            CanMessage::try_new(0x100, &long),
            Err(ProtocolError::PayloadTooLong { len: 9 })
        );
        assert_eq!(
            CanMessage::try_new(0x2000_0000, &[]),
            Err(ProtocolError::IdOutOfRange { id: 0x2000_0000 })
        );
    }

    #[test]
    fn payload_is_zero_padded() {
        let msg = CanMessage::new(0x42, &[0xAA, 0xBB]);
        assert_eq!(msg.data, [0xAA, 0xBB, 0, 0, 0, 0, 0, 0]);
        assert_eq!(msg.payload(), &[0xAA, 0xBB]);
    }

    #[test]
    fn empty_payload() {
        let msg = CanMessage::new(0x42, &[]);
        assert_eq!(msg.len, 0);
        assert!(msg.payload().is_empty());
    }
}
