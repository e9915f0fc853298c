//! Serial framing codec.
//!
//! The bridge firmware tunnels CAN messages over a byte stream as
//! `[SOF, length, escaped(id ++ payload)]`, where `length` counts the
//! *unescaped* identifier-plus-payload bytes (4 to 12) and the identifier
//! travels little-endian. Two byte values are reserved: a literal start
//! byte or escape byte inside the body is replaced by the escape byte
//! followed by a substitute, and reversed on decode.
//!
//! [`FrameDecoder`] is the receiving state machine. It is deliberately
//! forgiving: a malformed escape or an out-of-range length drops the
//! in-progress frame and resynchronizes on the next start byte, reporting
//! the fault to the caller instead of failing hard.

use smallvec::SmallVec;

use crate::{CanMessage, MAX_PAYLOAD_LEN};

/// Start-of-frame marker.
pub const SOF: u8 = 0xFF;
/// Escape introducer.
pub const ESC: u8 = 0xFE;
/// `ESC, SOF_SUBST` decodes to a literal `SOF` byte.
pub const SOF_SUBST: u8 = 0xFE;
/// `ESC, ESC_SUBST` decodes to a literal `ESC` byte.
pub const ESC_SUBST: u8 = 0xFD;

/// Identifier bytes at the front of every frame body.
const ID_LEN: usize = 4;
const MIN_BODY_LEN: usize = ID_LEN;
const MAX_BODY_LEN: usize = ID_LEN + MAX_PAYLOAD_LEN;

/// Worst case: SOF + length + every body byte escaped.
pub type EncodedFrame = SmallVec<[u8; 2 + 2 * MAX_BODY_LEN]>;

/// Encode one message as exactly one wire frame.
pub fn encode_frame(msg: &CanMessage) -> EncodedFrame {
    let mut buf = EncodedFrame::new();
    buf.push(SOF);
    buf.push((ID_LEN + msg.len as usize) as u8);
    for &byte in msg.id.to_le_bytes().iter().chain(msg.payload()) {
        match byte {
            SOF => {
                buf.push(ESC);
                buf.push(SOF_SUBST);
            }
            ESC => {
                buf.push(ESC);
                buf.push(ESC_SUBST);
            }
            _ => buf.push(byte),
        }
    }
    buf
}

/// Decoder phase, mirroring the shape of a frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Scanning for a start byte.
    Waiting,
    /// Start byte seen; next byte is the body length.
    Length,
    /// Accumulating `expected` unescaped body bytes.
    Payload,
}

/// A synchronization fault the decoder recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingFault {
    /// Escape introducer followed by a byte that is not a substitute.
    BadEscape(u8),
    /// Length byte outside the representable 4..=12 body range.
    BadLength(u8),
    /// A new start byte interrupted an unfinished frame.
    Interrupted,
}

/// Result of feeding one byte to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// Byte consumed; frame still in progress (or nothing in progress).
    Pending,
    /// A complete, well-formed message.
    Message(CanMessage),
    /// The in-progress frame was dropped; decoder has resynchronized.
    Fault(FramingFault),
}

/// Stateful byte-stream decoder. Owned by exactly one receive context;
/// state never escapes a single in-flight frame.
#[derive(Debug)]
pub struct FrameDecoder {
    phase: Phase,
    escape: bool,
    expected: usize,
    body: SmallVec<[u8; MAX_BODY_LEN]>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Waiting,
            escape: false,
            expected: 0,
            body: SmallVec::new(),
        }
    }

    /// Discard any in-progress frame and return to scanning.
    pub fn reset(&mut self) {
        self.phase = Phase::Waiting;
        self.escape = false;
        self.expected = 0;
        self.body.clear();
    }

    /// Feed one byte from the stream.
    pub fn push_byte(&mut self, byte: u8) -> Decoded {
        // A literal SOF can never occur inside a frame body (it is always
        // escaped), so it unconditionally starts a new frame. If one
        // interrupts an unfinished frame, that frame is lost.
        if byte == SOF {
            let interrupted = self.phase != Phase::Waiting;
            self.reset();
            self.phase = Phase::Length;
            return if interrupted {
                Decoded::Fault(FramingFault::Interrupted)
            } else {
                Decoded::Pending
            };
        }

        match self.phase {
            Phase::Waiting => Decoded::Pending,
            Phase::Length => {
                let len = byte as usize;
                if !(MIN_BODY_LEN..=MAX_BODY_LEN).contains(&len) {
                    self.reset();
                    return Decoded::Fault(FramingFault::BadLength(byte));
                }
                self.expected = len;
                self.phase = Phase::Payload;
                Decoded::Pending
            }
            Phase::Payload => {
                if self.escape {
                    self.escape = false;
                    let literal = match byte {
                        SOF_SUBST => SOF,
                        ESC_SUBST => ESC,
                        other => {
                            self.reset();
                            return Decoded::Fault(FramingFault::BadEscape(other));
                        }
                    };
                    self.accept(literal)
                } else if byte == ESC {
                    self.escape = true;
                    Decoded::Pending
                } else {
                    self.accept(byte)
                }
            }
        }
    }

    fn accept(&mut self, byte: u8) -> Decoded {
        self.body.push(byte);
        if self.body.len() < self.expected {
            return Decoded::Pending;
        }
        let id = u32::from_le_bytes([self.body[0], self.body[1], self.body[2], self.body[3]]);
        let msg = CanMessage::new(id, &self.body[ID_LEN..]);
        self.reset();
        Decoded::Message(msg)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
