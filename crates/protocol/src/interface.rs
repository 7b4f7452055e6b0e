//! Static interface descriptors.
//!
//! An [`Interface`] is the registration contract between the engine and the
//! code that implements a protocol interface: a name, a version, and ordered
//! request and event tables whose indices are the wire opcodes. Each entry
//! carries the argument signature the codec uses to encode or decode it.

use std::fmt;

/// Kind of a single message argument.
#[derive(Debug, Clone, Copy)]
pub enum ArgumentKind {
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    Uint,
    /// Signed 24.8 fixed-point number.
    Fixed,
    /// Length-prefixed, NUL-terminated UTF-8 string.
    Str,
    /// Id of an existing object (0 is null).
    Object,
    /// Id of an object created by this message.
    ///
    /// `None` for untyped ids, whose interface travels as separate
    /// arguments (as in `wl_registry.bind`).
    NewId(Option<&'static Interface>),
    /// Length-prefixed byte array.
    Array,
    /// File descriptor, sent out of band.
    Fd,
}

impl ArgumentKind {
    /// Name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Fixed => "fixed",
            Self::Str => "string",
            Self::Object => "object",
            Self::NewId(_) => "new_id",
            Self::Array => "array",
            Self::Fd => "fd",
        }
    }
}

impl PartialEq for ArgumentKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NewId(a), Self::NewId(b)) => a.map(|i| i.name) == b.map(|i| i.name),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Eq for ArgumentKind {}

/// One request or event of an interface.
#[derive(Debug)]
pub struct MessageDesc {
    /// Message name, e.g. `"sync"`.
    pub name: &'static str,
    /// Argument kinds in wire order.
    pub signature: &'static [ArgumentKind],
}

impl MessageDesc {
    /// Number of file descriptors a message of this kind carries.
    #[must_use]
    pub fn fd_count(&self) -> usize {
        self.signature
            .iter()
            .filter(|kind| matches!(kind, ArgumentKind::Fd))
            .count()
    }

    /// Interface of the object this message creates, if any.
    #[must_use]
    pub fn new_id_interface(&self) -> Option<&'static Interface> {
        self.signature.iter().find_map(|kind| match kind {
            ArgumentKind::NewId(interface) => *interface,
            _ => None,
        })
    }
}

/// Descriptor of a protocol interface.
pub struct Interface {
    /// Interface name as advertised on the wire, e.g. `"wl_compositor"`.
    pub name: &'static str,
    /// Highest version this descriptor implements.
    pub version: u32,
    /// Requests, indexed by opcode.
    pub requests: &'static [MessageDesc],
    /// Events, indexed by opcode.
    pub events: &'static [MessageDesc],
}

impl Interface {
    /// Look up a request by opcode.
    #[must_use]
    pub fn request(&self, opcode: u16) -> Option<&'static MessageDesc> {
        self.requests.get(usize::from(opcode))
    }

    /// Look up an event by opcode.
    #[must_use]
    pub fn event(&self, opcode: u16) -> Option<&'static MessageDesc> {
        self.events.get(usize::from(opcode))
    }

    /// Resolve an event name to its opcode.
    #[must_use]
    pub fn event_opcode(&self, name: &str) -> Option<u16> {
        self.events
            .iter()
            .position(|event| event.name == name)
            .map(|index| index as u16)
    }

    /// Resolve a request name to its opcode.
    #[must_use]
    pub fn request_opcode(&self, name: &str) -> Option<u16> {
        self.requests
            .iter()
            .position(|request| request.name == name)
            .map(|index| index as u16)
    }
}

// Signatures may point back at other interfaces, so only the name is shown.
impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Interface {}

/// `wl_display` opcodes.
pub mod display {
    /// Request: `sync(callback: new_id<wl_callback>)`.
    pub const SYNC: u16 = 0;
    /// Request: `get_registry(registry: new_id<wl_registry>)`.
    pub const GET_REGISTRY: u16 = 1;
    /// Event: `error(object_id: object, code: uint, message: string)`.
    pub const EVENT_ERROR: u16 = 0;
    /// Event: `delete_id(id: uint)`.
    pub const EVENT_DELETE_ID: u16 = 1;
}

/// `wl_registry` opcodes.
pub mod registry {
    /// Request: `bind(name: uint, interface: string, version: uint, id: new_id)`.
    pub const BIND: u16 = 0;
    /// Event: `global(name: uint, interface: string, version: uint)`.
    pub const EVENT_GLOBAL: u16 = 0;
    /// Event: `global_remove(name: uint)`.
    pub const EVENT_GLOBAL_REMOVE: u16 = 1;
}

/// `wl_callback` opcodes.
pub mod callback {
    /// Event: `done(callback_data: uint)`.
    pub const EVENT_DONE: u16 = 0;
}

/// Global error codes carried by `wl_display.error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    /// Server couldn't find the object.
    InvalidObject,
    /// Method doesn't exist on the interface or the request was malformed.
    InvalidMethod,
    /// Server is out of memory.
    NoMemory,
    /// Implementation error in the compositor.
    Implementation,
}

impl DisplayError {
    /// Map a raw error code; codes above 3 are interface-specific.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::InvalidObject),
            1 => Some(Self::InvalidMethod),
            2 => Some(Self::NoMemory),
            3 => Some(Self::Implementation),
            _ => None,
        }
    }
}

/// The core global object, always id 1.
pub static WL_DISPLAY: Interface = Interface {
    name: "wl_display",
    version: 1,
    requests: &[
        MessageDesc {
            name: "sync",
            signature: &[ArgumentKind::NewId(Some(&WL_CALLBACK))],
        },
        MessageDesc {
            name: "get_registry",
            signature: &[ArgumentKind::NewId(Some(&WL_REGISTRY))],
        },
    ],
    events: &[
        MessageDesc {
            name: "error",
            signature: &[ArgumentKind::Object, ArgumentKind::Uint, ArgumentKind::Str],
        },
        MessageDesc {
            name: "delete_id",
            signature: &[ArgumentKind::Uint],
        },
    ],
};

/// Global registry object.
pub static WL_REGISTRY: Interface = Interface {
    name: "wl_registry",
    version: 1,
    requests: &[MessageDesc {
        name: "bind",
        signature: &[
            ArgumentKind::Uint,
            ArgumentKind::Str,
            ArgumentKind::Uint,
            ArgumentKind::NewId(None),
        ],
    }],
    events: &[
        MessageDesc {
            name: "global",
            signature: &[ArgumentKind::Uint, ArgumentKind::Str, ArgumentKind::Uint],
        },
        MessageDesc {
            name: "global_remove",
            signature: &[ArgumentKind::Uint],
        },
    ],
};

/// One-shot completion callback.
pub static WL_CALLBACK: Interface = Interface {
    name: "wl_callback",
    version: 1,
    requests: &[],
    events: &[MessageDesc {
        name: "done",
        signature: &[ArgumentKind::Uint],
    }],
};
