//! Frame decoding and the pending-event queue.
//!
//! [`decode_frames`] turns the inbound byte buffer into queued [`Event`]s.
//! It consumes whole frames only; a trailing partial frame stays in the
//! buffer until a later receive completes it, so the result does not depend
//! on how the stream was chunked.

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::objects::{Lookup, ObjectRegistry, Proxy};
use std::collections::VecDeque;
use std::os::fd::OwnedFd;
use waylink_protocol::{
    Argument, ArgumentKind, MessageDesc, MessageHeader, ObjectId, decode_arguments,
};

/// A decoded event waiting for dispatch.
#[derive(Debug, PartialEq)]
pub struct Event {
    /// Object the event was addressed to.
    pub sender: ObjectId,
    /// Event index within the sender's interface.
    pub opcode: u16,
    /// Decoded arguments, in signature order.
    pub args: Vec<Argument>,
}

/// Callback run for one event of one object.
pub type EventHandler = Box<dyn FnMut(&mut Connection, Event) -> Result<(), ConnectionError>>;

/// Box a closure as an [`EventHandler`].
pub fn handler<F>(f: F) -> EventHandler
where
    F: FnMut(&mut Connection, Event) -> Result<(), ConnectionError> + 'static,
{
    Box::new(f)
}

/// FIFO of decoded events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Decode every complete frame in `buf` into `queue`.
///
/// Consumed bytes are removed from `buf`; descriptors are taken from `fds`
/// in signature order. Frames addressed to ids pending deletion are
/// discarded along with the descriptors they carry. Returns the number of
/// events queued.
pub fn decode_frames(
    buf: &mut Vec<u8>,
    fds: &mut VecDeque<OwnedFd>,
    objects: &mut ObjectRegistry,
    queue: &mut EventQueue,
) -> Result<usize, ConnectionError> {
    let mut offset = 0;
    let mut queued = 0;

    while let Some(header) = MessageHeader::parse(&buf[offset..]) {
        header.validate()?;
        let size = usize::from(header.size);
        if buf.len() - offset < size {
            break;
        }
        let body = &buf[offset + MessageHeader::SIZE..offset + size];

        match objects.lookup(header.object_id)? {
            Lookup::Dead(interface) => {
                if let Some(desc) = interface.event(header.opcode) {
                    discard_event(desc, body, fds, objects);
                }
                tracing::trace!(
                    object_id = header.object_id,
                    opcode = header.opcode,
                    "discarding event for deleted object"
                );
            }
            Lookup::Live(proxy) => {
                let interface = proxy.interface();
                let version = proxy.version();
                let desc = interface
                    .event(header.opcode)
                    .ok_or(ConnectionError::UnknownOpcode {
                        object_id: header.object_id,
                        interface: interface.name,
                        opcode: header.opcode,
                    })?;
                let args = decode_arguments(desc.signature, body, fds)?;

                // Objects the server creates become addressable immediately,
                // before later frames in the same buffer are decoded.
                for (kind, arg) in desc.signature.iter().zip(&args) {
                    if let (ArgumentKind::NewId(Some(child)), Argument::NewId(id)) = (kind, arg) {
                        objects.register(Proxy::new(*id, child, version))?;
                    }
                }

                tracing::trace!(
                    object_id = header.object_id,
                    interface = interface.name,
                    event = desc.name,
                    "event decoded"
                );
                queue.push(Event {
                    sender: header.object_id,
                    opcode: header.opcode,
                    args,
                });
                queued += 1;
            }
        }
        offset += size;
    }

    buf.drain(..offset);
    Ok(queued)
}

/// Drop an event addressed to a dead object, closing its descriptors and
/// retiring any objects it created.
fn discard_event(
    desc: &MessageDesc,
    body: &[u8],
    fds: &mut VecDeque<OwnedFd>,
    objects: &mut ObjectRegistry,
) {
    match decode_arguments(desc.signature, body, fds) {
        Ok(args) => {
            for (kind, arg) in desc.signature.iter().zip(&args) {
                if let (ArgumentKind::NewId(Some(child)), Argument::NewId(id)) = (kind, arg) {
                    objects.mark_orphan(*id, child);
                }
            }
        }
        Err(e) => {
            for _ in 0..desc.fd_count().min(fds.len()) {
                drop(fds.pop_front());
            }
            tracing::trace!(error = %e, "undecodable event for deleted object");
        }
    }
}
