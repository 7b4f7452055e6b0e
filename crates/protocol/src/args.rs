//! Argument values and their wire encoding.
//!
//! Layout rules:
//! - `int`, `uint`, `object`, `new_id`: one 32-bit word
//! - `fixed`: `i32` holding `value * 256`
//! - `string`, `array`: 32-bit length, the bytes, zero padding to a 4-byte
//!   boundary (string lengths include the terminating NUL)
//! - `fd`: nothing in the payload; the descriptor travels as ancillary data

use crate::interface::ArgumentKind;
use crate::wire::{MessageHeader, ProtocolError};
use std::collections::VecDeque;
use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd};

/// Size of a protocol word in bytes. Messages are always a multiple of this.
pub const WORD_SIZE: usize = 4;

/// Round `len` up to the next word boundary.
#[must_use]
pub const fn padded_len(len: usize) -> usize {
    (len + WORD_SIZE - 1) & !(WORD_SIZE - 1)
}

/// Signed 24.8 fixed-point number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed(i32);

impl Fixed {
    /// Wrap a raw wire value.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    #[must_use]
    pub const fn to_raw(self) -> i32 {
        self.0
    }

    /// Convert an integer exactly.
    #[must_use]
    pub const fn from_int(value: i32) -> Self {
        Self(value.wrapping_mul(256))
    }

    /// Convert a float, rounding to the nearest 1/256.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        Self((value * 256.0).round() as i32)
    }

    /// Value as a float.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / 256.0
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({})", self.to_f64())
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

/// A decoded or to-be-encoded argument value.
#[derive(Debug)]
pub enum Argument {
    Int(i32),
    Uint(u32),
    Fixed(Fixed),
    Str(String),
    Object(u32),
    NewId(u32),
    Array(Vec<u8>),
    Fd(OwnedFd),
}

impl Argument {
    /// Whether this value can be encoded as `kind`.
    #[must_use]
    pub fn matches(&self, kind: &ArgumentKind) -> bool {
        matches!(
            (self, kind),
            (Self::Int(_), ArgumentKind::Int)
                | (Self::Uint(_), ArgumentKind::Uint)
                | (Self::Fixed(_), ArgumentKind::Fixed)
                | (Self::Str(_), ArgumentKind::Str)
                | (Self::Object(_), ArgumentKind::Object)
                | (Self::NewId(_), ArgumentKind::NewId(_))
                | (Self::Array(_), ArgumentKind::Array)
                | (Self::Fd(_), ArgumentKind::Fd)
        )
    }
}

// Descriptors compare by number; two values naming the same open fd are equal.
impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Fixed(a), Self::Fixed(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::NewId(a), Self::NewId(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Fd(a), Self::Fd(b)) => a.as_raw_fd() == b.as_raw_fd(),
            _ => false,
        }
    }
}

/// An encoded request ready for the outbound queue.
#[derive(Debug)]
pub struct EncodedMessage {
    /// Header and argument bytes.
    pub bytes: Vec<u8>,
    /// Descriptors to attach, in signature order.
    pub fds: Vec<OwnedFd>,
}

/// Encode a request addressed to `object_id`.
///
/// `args` must match `signature` one-to-one.
pub fn encode_request(
    object_id: u32,
    opcode: u16,
    signature: &[ArgumentKind],
    args: Vec<Argument>,
) -> Result<EncodedMessage, ProtocolError> {
    if args.len() != signature.len() {
        return Err(ProtocolError::ArgumentCount {
            expected: signature.len(),
            got: args.len(),
        });
    }

    let mut body = Vec::new();
    let mut fds = Vec::new();
    for (index, (arg, kind)) in args.into_iter().zip(signature).enumerate() {
        if !arg.matches(kind) {
            return Err(ProtocolError::ArgumentMismatch {
                index,
                expected: kind.name(),
            });
        }
        match arg {
            Argument::Int(value) => body.extend_from_slice(&value.to_ne_bytes()),
            Argument::Uint(value) | Argument::Object(value) | Argument::NewId(value) => {
                body.extend_from_slice(&value.to_ne_bytes());
            }
            Argument::Fixed(value) => body.extend_from_slice(&value.to_raw().to_ne_bytes()),
            Argument::Str(value) => {
                let mut bytes = value.into_bytes();
                bytes.push(0);
                put_array(&mut body, &bytes);
            }
            Argument::Array(bytes) => put_array(&mut body, &bytes),
            Argument::Fd(fd) => fds.push(fd),
        }
    }

    let header = MessageHeader::new(object_id, opcode, body.len())?;
    let mut bytes = Vec::with_capacity(MessageHeader::SIZE + body.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&body);
    Ok(EncodedMessage { bytes, fds })
}

fn put_array(body: &mut Vec<u8>, bytes: &[u8]) {
    body.extend_from_slice(&(bytes.len() as u32).to_ne_bytes());
    body.extend_from_slice(bytes);
    body.resize(padded_len(body.len()), 0);
}

/// Decode the argument bytes of one message.
///
/// Descriptors are taken from the front of `fds`, one per `fd` argument.
pub fn decode_arguments(
    signature: &[ArgumentKind],
    body: &[u8],
    fds: &mut VecDeque<OwnedFd>,
) -> Result<Vec<Argument>, ProtocolError> {
    let mut reader = BodyReader { body, pos: 0 };
    let mut args = Vec::with_capacity(signature.len());

    for kind in signature {
        let arg = match kind {
            ArgumentKind::Int => Argument::Int(reader.word()? as i32),
            ArgumentKind::Uint => Argument::Uint(reader.word()?),
            ArgumentKind::Fixed => Argument::Fixed(Fixed::from_raw(reader.word()? as i32)),
            ArgumentKind::Object => Argument::Object(reader.word()?),
            ArgumentKind::NewId(_) => Argument::NewId(reader.word()?),
            ArgumentKind::Str => {
                let mut bytes = reader.array()?.to_vec();
                if bytes.last() == Some(&0) {
                    bytes.pop();
                }
                Argument::Str(String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidString)?)
            }
            ArgumentKind::Array => Argument::Array(reader.array()?.to_vec()),
            ArgumentKind::Fd => Argument::Fd(fds.pop_front().ok_or(ProtocolError::MissingFd)?),
        };
        args.push(arg);
    }

    let remaining = body.len() - reader.pos;
    if remaining != 0 {
        return Err(ProtocolError::TrailingBytes(remaining));
    }
    Ok(args)
}

struct BodyReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let available = self.body.len() - self.pos;
        if len > available {
            return Err(ProtocolError::Truncated {
                needed: len,
                available,
            });
        }
        let bytes = &self.body[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn word(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(WORD_SIZE)?;
        Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn array(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.word()? as usize;
        let padded = self.take(padded_len(len))?;
        Ok(&padded[..len])
    }
}
