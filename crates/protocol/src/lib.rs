//! waylink protocol - wire codec for the Wayland display protocol.
//!
//! This crate provides:
//! - [`MessageHeader`] framing and the codec's [`ProtocolError`]
//! - [`Argument`] values with [`encode_request`] / [`decode_arguments`]
//! - Static [`Interface`] descriptors, including the core
//!   [`WL_DISPLAY`], [`WL_REGISTRY`] and [`WL_CALLBACK`] interfaces
//! - Socket path helpers via [`get_socket_path`]
//!
//! # Wire Format
//!
//! Each message is an 8-byte header (object id, then size and opcode packed
//! into one word) followed by 32-bit aligned arguments, all in native byte
//! order. File descriptors travel as `SCM_RIGHTS` ancillary data.
//!
//! # Example
//!
//! ```rust
//! use std::collections::VecDeque;
//! use waylink_protocol::{Argument, MessageHeader, WL_DISPLAY, decode_arguments, display, encode_request};
//!
//! // wl_display.sync(new_id = 3)
//! let sync = WL_DISPLAY.request(display::SYNC).unwrap();
//! let message = encode_request(1, display::SYNC, sync.signature, vec![Argument::NewId(3)]).unwrap();
//!
//! let header = MessageHeader::parse(&message.bytes).unwrap();
//! assert_eq!(header.size, 12);
//!
//! let args = decode_arguments(sync.signature, &message.bytes[8..], &mut VecDeque::new()).unwrap();
//! assert_eq!(args, vec![Argument::NewId(3)]);
//! ```

mod args;
mod interface;
mod socket;
mod wire;

// Re-export main types at crate root
pub use args::{
    Argument, EncodedMessage, Fixed, WORD_SIZE, decode_arguments, encode_request, padded_len,
};
pub use interface::{
    ArgumentKind, DisplayError, Interface, MessageDesc, WL_CALLBACK, WL_DISPLAY, WL_REGISTRY,
    callback, display, registry,
};
pub use socket::{
    DEFAULT_DISPLAY, DISPLAY_ENV_VAR, RUNTIME_DIR_ENV_VAR, get_display_name, get_socket_path,
    resolve_socket_path,
};
pub use wire::{MessageHeader, ProtocolError};

/// Object id type.
pub type ObjectId = u32;

/// Id of the display object on every connection.
pub const DISPLAY_ID: ObjectId = 1;

/// First id of the range the server allocates from.
pub const SERVER_ID_START: ObjectId = 0xff00_0000;
