//! Message framing for the Wayland wire protocol.
//!
//! Every message starts with an 8-byte header in native byte order:
//! - 4 bytes: target object id
//! - 4 bytes: `(size << 16) | opcode`, where `size` counts the header itself
//!
//! There is no other length prefix; a stream reader must buffer until it
//! holds `size` bytes.

use thiserror::Error;

/// Error type for codec operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A header declared a size that cannot frame a message.
    #[error("invalid message size {size} for object {object_id}")]
    InvalidSize {
        /// Target object of the bad frame.
        object_id: u32,
        /// Declared size.
        size: u16,
    },

    /// A length field ran past the end of the message body.
    #[error("message body truncated: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the argument claimed.
        needed: usize,
        /// Bytes remaining in the body.
        available: usize,
    },

    /// Bytes were left over after every argument was decoded.
    #[error("{0} trailing bytes after the last argument")]
    TrailingBytes(usize),

    /// String argument was not valid UTF-8.
    #[error("string argument is not valid utf-8")]
    InvalidString,

    /// The signature expects a file descriptor that was never received.
    #[error("expected a file descriptor but none was received")]
    MissingFd,

    /// Arguments do not match the message signature.
    #[error("argument {index} does not match the signature (expected {expected})")]
    ArgumentMismatch {
        /// Position of the first mismatching argument.
        index: usize,
        /// Kind the signature asks for.
        expected: &'static str,
    },

    /// Wrong number of arguments for the message signature.
    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount {
        /// Arity of the signature.
        expected: usize,
        /// Number supplied.
        got: usize,
    },

    /// The encoded message does not fit in the 16-bit size field.
    #[error("message of {0} bytes exceeds the maximum frame size")]
    MessageTooLarge(usize),
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Object the message is addressed to.
    pub object_id: u32,
    /// Total message size in bytes, header included.
    pub size: u16,
    /// Request or event index within the target's interface.
    pub opcode: u16,
}

impl MessageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;

    /// Largest message the size field can describe.
    pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

    /// Create a header for a message with `body_len` argument bytes.
    pub fn new(object_id: u32, opcode: u16, body_len: usize) -> Result<Self, ProtocolError> {
        let total = Self::SIZE + body_len;
        if total > Self::MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(total));
        }
        Ok(Self {
            object_id,
            size: total as u16,
            opcode,
        })
    }

    /// Parse a header from the front of a buffer.
    ///
    /// Returns `None` if the buffer is too small.
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let object_id = u32::from_ne_bytes(buf[0..4].try_into().ok()?);
        let size_opcode = u32::from_ne_bytes(buf[4..8].try_into().ok()?);
        Some(Self {
            object_id,
            size: (size_opcode >> 16) as u16,
            opcode: (size_opcode & 0xffff) as u16,
        })
    }

    /// Serialize this header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let size_opcode = (u32::from(self.size) << 16) | u32::from(self.opcode);
        buf[0..4].copy_from_slice(&self.object_id.to_ne_bytes());
        buf[4..8].copy_from_slice(&size_opcode.to_ne_bytes());
        buf
    }

    /// Check that the declared size can hold a well-formed message.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let size = usize::from(self.size);
        if size < Self::SIZE || size % 4 != 0 {
            return Err(ProtocolError::InvalidSize {
                object_id: self.object_id,
                size: self.size,
            });
        }
        Ok(())
    }

    /// Number of argument bytes following the header.
    #[must_use]
    pub fn body_len(&self) -> usize {
        usize::from(self.size).saturating_sub(Self::SIZE)
    }
}
