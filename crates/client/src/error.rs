//! Error type for connection operations.

use thiserror::Error;
use waylink_protocol::{ObjectId, ProtocolError};

/// Error type for connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Socket error other than would-block.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame or argument.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server addressed an object the client never created or already destroyed.
    #[error("server referenced unknown object {0}")]
    UnknownObject(ObjectId),

    /// The server sent an opcode the target's interface does not define.
    #[error("unknown opcode {opcode} for {interface}@{object_id}")]
    UnknownOpcode {
        object_id: ObjectId,
        interface: &'static str,
        opcode: u16,
    },

    /// A request opcode outside the target's interface.
    #[error("{interface} has no request {opcode}")]
    UnknownRequest { interface: &'static str, opcode: u16 },

    /// An id is already in use.
    #[error("object id {0} is already in use")]
    DuplicateId(ObjectId),

    /// The client id range is used up.
    #[error("client object ids exhausted")]
    IdsExhausted,

    /// Operation on an object that is not live.
    #[error("object {0} does not exist")]
    NoSuchObject(ObjectId),

    /// Event opcode outside the interface's event table.
    #[error("{interface} has no event {opcode}")]
    UnknownEvent { interface: &'static str, opcode: u16 },

    /// Event name not present in the interface.
    #[error("{interface} has no event named {name:?}")]
    UnknownEventName { interface: &'static str, name: String },

    /// A request creating an untyped object must go through a dedicated path.
    #[error("request {opcode} of {interface} does not create a typed object")]
    NotAConstructor { interface: &'static str, opcode: u16 },

    /// Dispatch was requested from inside an event handler.
    #[error("events are already being dispatched")]
    NestedDispatch,

    /// Decoded arguments did not have the shape a core handler expects.
    #[error("unexpected arguments for {interface}.{event}")]
    UnexpectedArguments {
        interface: &'static str,
        event: &'static str,
    },

    /// Fatal error event sent by the server.
    #[error("server error {code} on {interface}@{object_id}: {message}")]
    Server {
        object_id: ObjectId,
        interface: String,
        code: u32,
        message: String,
    },

    /// `XDG_RUNTIME_DIR` is needed to locate the socket but is unset.
    #[error("XDG_RUNTIME_DIR is not set and no absolute socket path was given")]
    NoRuntimeDir,

    /// The connection was torn down by an earlier fatal error.
    #[error("connection is closed")]
    Disconnected,
}

impl ConnectionError {
    /// Whether this error terminates the connection.
    ///
    /// Caller mistakes (bad arguments, unknown objects or handler names) leave
    /// the connection usable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Protocol(ProtocolError::ArgumentCount { .. })
                | Self::Protocol(ProtocolError::ArgumentMismatch { .. })
                | Self::Protocol(ProtocolError::MessageTooLarge(_))
                | Self::UnknownRequest { .. }
                | Self::NoSuchObject(_)
                | Self::UnknownEvent { .. }
                | Self::UnknownEventName { .. }
                | Self::NotAConstructor { .. }
                | Self::NestedDispatch
                | Self::NoRuntimeDir
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ConnectionError::UnknownObject(7).is_fatal());
        assert!(ConnectionError::Protocol(ProtocolError::InvalidString).is_fatal());
        assert!(
            ConnectionError::Server {
                object_id: 1,
                interface: "wl_display".to_string(),
                code: 1,
                message: "bad".to_string(),
            }
            .is_fatal()
        );

        assert!(!ConnectionError::NoSuchObject(4).is_fatal());
        assert!(!ConnectionError::NestedDispatch.is_fatal());
        assert!(
            !ConnectionError::Protocol(ProtocolError::ArgumentCount {
                expected: 1,
                got: 0
            })
            .is_fatal()
        );
    }

    #[test]
    fn test_server_error_message() {
        let err = ConnectionError::Server {
            object_id: 3,
            interface: "wl_surface".to_string(),
            code: 2,
            message: "invalid scale".to_string(),
        };
        assert_eq!(err.to_string(), "server error 2 on wl_surface@3: invalid scale");
    }
}
