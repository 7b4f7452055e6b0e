//! The connection context.
//!
//! A [`Connection`] owns the transport, the object table, the pending-event
//! queue and the globals bookkeeping. It is driven by one caller at a time:
//! handlers receive `&mut Connection` and may queue requests, create or
//! destroy objects, and replace handlers while they run.

use crate::config::ConnectionConfig;
use crate::dispatch::{Event, EventHandler, EventQueue, decode_frames, handler};
use crate::error::ConnectionError;
use crate::globals::{GlobalTemplate, Globals, handle_global, handle_global_remove};
use crate::objects::{ObjectRegistry, Proxy};
use crate::socket::Socket;
use crate::transport::Transport;
use std::cell::Cell;
use std::os::fd::RawFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use waylink_protocol::{
    Argument, ArgumentKind, DISPLAY_ID, DisplayError, Interface, ObjectId, WL_DISPLAY, callback,
    display, encode_request, registry,
};

/// A client connection to a display server.
pub struct Connection {
    transport: Transport,
    pub(crate) objects: ObjectRegistry,
    queue: EventQueue,
    pub(crate) globals: Globals,
    pub(crate) templates: Vec<GlobalTemplate>,
    registry: ObjectId,
    connected: bool,
    dispatching: bool,
}

impl Connection {
    /// Connect to the display server described by `config` and bootstrap.
    ///
    /// Globals matching one of `templates` are bound during the initial
    /// roundtrip.
    pub fn connect(
        config: &ConnectionConfig,
        templates: Vec<GlobalTemplate>,
    ) -> Result<Self, ConnectionError> {
        let path = config.socket_path().ok_or(ConnectionError::NoRuntimeDir)?;
        let stream = UnixStream::connect(&path)?;
        stream.set_nonblocking(true)?;
        tracing::info!(path = %path.display(), "connected to display server");

        Self::from_socket(stream, templates, config.recv_chunk_size)
    }

    /// Bootstrap over an already connected, non-blocking socket.
    pub fn from_socket<S>(
        socket: S,
        templates: Vec<GlobalTemplate>,
        recv_chunk_size: usize,
    ) -> Result<Self, ConnectionError>
    where
        S: Socket + 'static,
    {
        let mut conn = Self::new(Box::new(socket), templates, recv_chunk_size)?;
        conn.roundtrip()?;
        tracing::debug!(
            globals = conn.globals.len(),
            objects = conn.objects.len(),
            "bootstrap complete"
        );
        Ok(conn)
    }

    /// Register the display and queue `get_registry`, without any I/O.
    fn new(
        socket: Box<dyn Socket>,
        templates: Vec<GlobalTemplate>,
        recv_chunk_size: usize,
    ) -> Result<Self, ConnectionError> {
        let mut conn = Self {
            transport: Transport::new(socket, recv_chunk_size),
            objects: ObjectRegistry::new(),
            queue: EventQueue::new(),
            globals: Globals::default(),
            templates,
            registry: 0,
            connected: true,
            dispatching: false,
        };

        let display_id = conn.objects.allocate_id()?;
        debug_assert_eq!(display_id, DISPLAY_ID);
        conn.objects.register(Proxy::new(DISPLAY_ID, &WL_DISPLAY, 1))?;
        conn.set_handler(DISPLAY_ID, display::EVENT_ERROR, handle_display_error)?;
        conn.set_handler(DISPLAY_ID, display::EVENT_DELETE_ID, handle_delete_id)?;

        conn.registry = conn.create_object(DISPLAY_ID, display::GET_REGISTRY, Vec::new())?;
        conn.set_handler(conn.registry, registry::EVENT_GLOBAL, handle_global)?;
        conn.set_handler(conn.registry, registry::EVENT_GLOBAL_REMOVE, handle_global_remove)?;

        Ok(conn)
    }

    /// Id of the display object.
    #[must_use]
    pub fn display(&self) -> ObjectId {
        DISPLAY_ID
    }

    /// Id of the registry object.
    #[must_use]
    pub fn registry(&self) -> ObjectId {
        self.registry
    }

    /// Advertised and bound globals.
    #[must_use]
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// A live object, if `id` refers to one.
    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&Proxy> {
        self.objects.get(id)
    }

    /// Whether the connection is still usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Requests queued but not yet written.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.transport.pending_requests()
    }

    /// Underlying socket descriptor, for registration with a poller.
    #[must_use]
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.transport.raw_fd()
    }

    /// Install the handler for event `opcode` of object `id`.
    pub fn set_handler<F>(&mut self, id: ObjectId, opcode: u16, f: F) -> Result<(), ConnectionError>
    where
        F: FnMut(&mut Connection, Event) -> Result<(), ConnectionError> + 'static,
    {
        self.install(id, opcode, handler(f))
    }

    /// Install a handler by event name.
    pub fn set_handler_by_name<F>(
        &mut self,
        id: ObjectId,
        name: &str,
        f: F,
    ) -> Result<(), ConnectionError>
    where
        F: FnMut(&mut Connection, Event) -> Result<(), ConnectionError> + 'static,
    {
        let interface = self.live_interface(id)?;
        let opcode =
            interface
                .event_opcode(name)
                .ok_or_else(|| ConnectionError::UnknownEventName {
                    interface: interface.name,
                    name: name.to_string(),
                })?;
        self.install(id, opcode, handler(f))
    }

    fn install(
        &mut self,
        id: ObjectId,
        opcode: u16,
        handler: EventHandler,
    ) -> Result<(), ConnectionError> {
        let proxy = self
            .objects
            .get_mut(id)
            .ok_or(ConnectionError::NoSuchObject(id))?;
        if proxy.set_handler(opcode, handler) {
            Ok(())
        } else {
            Err(ConnectionError::UnknownEvent {
                interface: proxy.interface().name,
                opcode,
            })
        }
    }

    fn live_interface(&self, id: ObjectId) -> Result<&'static Interface, ConnectionError> {
        self.objects
            .get(id)
            .map(Proxy::interface)
            .ok_or(ConnectionError::NoSuchObject(id))
    }

    /// Encode and queue request `opcode` on object `id`.
    ///
    /// Nothing is written until the next flush or dispatch.
    pub fn send_request(
        &mut self,
        id: ObjectId,
        opcode: u16,
        args: Vec<Argument>,
    ) -> Result<(), ConnectionError> {
        self.ensure_connected()?;
        let interface = self.live_interface(id)?;
        let desc = interface
            .request(opcode)
            .ok_or(ConnectionError::UnknownRequest {
                interface: interface.name,
                opcode,
            })?;
        let message = encode_request(id, opcode, desc.signature, args)?;
        tracing::trace!(
            object_id = id,
            interface = interface.name,
            request = desc.name,
            "request queued"
        );
        self.transport.queue(message);
        Ok(())
    }

    /// Send a request that creates a new object and register its proxy.
    ///
    /// `args` omits the `new_id` argument; a fresh id is inserted at its
    /// position in the signature. The child inherits the parent's version.
    pub fn create_object(
        &mut self,
        parent: ObjectId,
        opcode: u16,
        mut args: Vec<Argument>,
    ) -> Result<ObjectId, ConnectionError> {
        self.ensure_connected()?;
        let proxy = self
            .objects
            .get(parent)
            .ok_or(ConnectionError::NoSuchObject(parent))?;
        let (interface, version) = (proxy.interface(), proxy.version());
        let desc = interface
            .request(opcode)
            .ok_or(ConnectionError::UnknownRequest {
                interface: interface.name,
                opcode,
            })?;
        let (slot, child) = desc
            .signature
            .iter()
            .enumerate()
            .find_map(|(i, kind)| match kind {
                ArgumentKind::NewId(Some(child)) => Some((i, *child)),
                _ => None,
            })
            .ok_or(ConnectionError::NotAConstructor {
                interface: interface.name,
                opcode,
            })?;
        if slot > args.len() {
            return Err(waylink_protocol::ProtocolError::ArgumentCount {
                expected: desc.signature.len(),
                got: args.len() + 1,
            }
            .into());
        }

        let id = self.objects.allocate_id()?;
        args.insert(slot, Argument::NewId(id));
        let message = match encode_request(parent, opcode, desc.signature, args) {
            Ok(message) => message,
            Err(e) => {
                self.objects.release_unused(id);
                return Err(e.into());
            }
        };
        self.objects.register(Proxy::new(id, child, version))?;
        tracing::trace!(
            object_id = parent,
            interface = interface.name,
            request = desc.name,
            new_id = id,
            child = child.name,
            "request queued"
        );
        self.transport.queue(message);
        Ok(id)
    }

    /// Send a destructor request, then retire the id until the server
    /// acknowledges it.
    pub fn destroy_object(
        &mut self,
        id: ObjectId,
        opcode: u16,
        args: Vec<Argument>,
    ) -> Result<(), ConnectionError> {
        self.send_request(id, opcode, args)?;
        self.objects.mark_pending_delete(id);
        Ok(())
    }

    /// Bind global `name` as `interface` at `version`.
    pub(crate) fn bind(
        &mut self,
        name: u32,
        interface: &'static Interface,
        version: u32,
    ) -> Result<ObjectId, ConnectionError> {
        let id = self.objects.allocate_id()?;
        let sent = self.send_request(
            self.registry,
            registry::BIND,
            vec![
                Argument::Uint(name),
                Argument::Str(interface.name.to_string()),
                Argument::Uint(version),
                Argument::NewId(id),
            ],
        );
        if let Err(e) = sent {
            self.objects.release_unused(id);
            return Err(e);
        }
        self.objects.register(Proxy::new(id, interface, version))?;
        tracing::debug!(name, interface = interface.name, version, id, "bound global");
        Ok(id)
    }

    /// Issue `wl_display.sync` and return the callback's id.
    pub fn sync(&mut self) -> Result<ObjectId, ConnectionError> {
        self.create_object(DISPLAY_ID, display::SYNC, Vec::new())
    }

    /// Block until the server has processed every request sent so far.
    ///
    /// Returns the number of events dispatched while waiting. Fails with
    /// `NestedDispatch` when called from an event handler.
    pub fn roundtrip(&mut self) -> Result<usize, ConnectionError> {
        self.ensure_not_dispatching()?;
        let callback = self.sync()?;
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        self.set_handler(callback, callback::EVENT_DONE, move |_, _| {
            flag.set(true);
            Ok(())
        })?;

        let mut dispatched = 0;
        while !done.get() {
            dispatched += self.dispatch_once()?;
        }
        Ok(dispatched)
    }

    /// Write queued requests. Returns `true` if the queue is now empty.
    pub fn flush(&mut self) -> Result<bool, ConnectionError> {
        self.ensure_connected()?;
        let result = self.transport.flush().map_err(ConnectionError::from);
        self.check(result)
    }

    /// Perform one non-blocking receive and decode whatever it completed.
    ///
    /// Returns `None` when the socket had nothing to read, otherwise the
    /// number of events queued (possibly zero for a partial frame).
    pub fn read_events(&mut self) -> Result<Option<usize>, ConnectionError> {
        self.ensure_connected()?;
        let result = self.read_once();
        self.check(result)
    }

    /// Flush, block until at least one event is queued, then dispatch the
    /// whole queue. Returns the number of events dispatched.
    pub fn dispatch_once(&mut self) -> Result<usize, ConnectionError> {
        self.ensure_connected()?;
        self.ensure_not_dispatching()?;
        let result = self.fill_queue();
        self.check(result)?;
        self.dispatch_pending()
    }

    /// Dispatch already queued events without reading.
    ///
    /// Handlers may queue requests but must not dispatch again; doing so
    /// fails with `NestedDispatch` and leaves the queue untouched.
    pub fn dispatch_pending(&mut self) -> Result<usize, ConnectionError> {
        self.ensure_connected()?;
        self.ensure_not_dispatching()?;
        self.dispatching = true;
        let result = self.drain_queue();
        self.dispatching = false;
        result
    }

    fn drain_queue(&mut self) -> Result<usize, ConnectionError> {
        let mut dispatched = 0;
        while let Some(event) = self.queue.pop() {
            dispatched += 1;
            let result = self.dispatch_event(event);
            self.check(result)?;
        }
        Ok(dispatched)
    }

    /// Shut the socket down. Later calls fail with `Disconnected`.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.transport.shutdown();
            self.connected = false;
            tracing::debug!("disconnected");
        }
    }

    fn fill_queue(&mut self) -> Result<(), ConnectionError> {
        self.transport.flush()?;
        while self.queue.is_empty() {
            if self.read_once()?.is_none() {
                self.transport.wait()?;
                self.transport.flush()?;
            }
        }
        Ok(())
    }

    fn read_once(&mut self) -> Result<Option<usize>, ConnectionError> {
        if self.transport.receive()?.is_none() {
            return Ok(None);
        }
        let queued = decode_frames(
            &mut self.transport.inbound,
            &mut self.transport.incoming_fds,
            &mut self.objects,
            &mut self.queue,
        )?;
        Ok(Some(queued))
    }

    fn dispatch_event(&mut self, event: Event) -> Result<(), ConnectionError> {
        let (id, opcode) = (event.sender, event.opcode);
        let Some(proxy) = self.objects.get_mut(id) else {
            tracing::debug!(object_id = id, opcode, "target destroyed, event dropped");
            return Ok(());
        };
        let Some(mut handler) = proxy.take_handler(opcode) else {
            tracing::debug!(
                object_id = id,
                interface = proxy.interface().name,
                opcode,
                "no handler installed, event dropped"
            );
            return Ok(());
        };

        let result = handler(self, event);
        if let Some(proxy) = self.objects.get_mut(id) {
            proxy.restore_handler(opcode, handler);
        }
        result
    }

    fn ensure_not_dispatching(&self) -> Result<(), ConnectionError> {
        if self.dispatching {
            Err(ConnectionError::NestedDispatch)
        } else {
            Ok(())
        }
    }

    fn ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.connected {
            Ok(())
        } else {
            Err(ConnectionError::Disconnected)
        }
    }

    /// Tear the connection down if `result` carries a fatal error.
    fn check<T>(&mut self, result: Result<T, ConnectionError>) -> Result<T, ConnectionError> {
        if let Err(e) = &result {
            if e.is_fatal() && self.connected {
                tracing::debug!(error = %e, "fatal error, closing connection");
                self.disconnect();
            }
        }
        result
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("registry", &self.registry)
            .field("objects", &self.objects.len())
            .field("queued_events", &self.queue.len())
            .field("connected", &self.connected)
            .field("dispatching", &self.dispatching)
            .finish_non_exhaustive()
    }
}

fn handle_display_error(conn: &mut Connection, event: Event) -> Result<(), ConnectionError> {
    let [
        Argument::Object(object_id),
        Argument::Uint(code),
        Argument::Str(message),
    ] = event.args.as_slice()
    else {
        return Err(ConnectionError::UnexpectedArguments {
            interface: WL_DISPLAY.name,
            event: "error",
        });
    };

    let interface = conn
        .objects
        .get(*object_id)
        .map_or("unknown", |proxy| proxy.interface().name);
    tracing::error!(
        object_id,
        interface,
        code,
        kind = ?DisplayError::from_code(*code),
        message = %message,
        "display server reported a fatal error"
    );

    Err(ConnectionError::Server {
        object_id: *object_id,
        interface: interface.to_string(),
        code: *code,
        message: message.clone(),
    })
}

fn handle_delete_id(conn: &mut Connection, event: Event) -> Result<(), ConnectionError> {
    let [Argument::Uint(id)] = event.args.as_slice() else {
        return Err(ConnectionError::UnexpectedArguments {
            interface: WL_DISPLAY.name,
            event: "delete_id",
        });
    };
    if !conn.objects.confirm_delete(*id) {
        tracing::warn!(id, "delete_id for unknown object ignored");
    }
    Ok(())
}
