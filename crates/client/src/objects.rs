//! Object id allocation and the live-object table.
//!
//! Ids move through three states:
//! - live: present in the table, frames to it are dispatched
//! - dead: deletion requested, frames to it are discarded, id not reusable
//! - free: the server acknowledged deletion, id may be handed out again

use crate::dispatch::EventHandler;
use crate::error::ConnectionError;
use std::collections::{HashMap, VecDeque};
use waylink_protocol::{Interface, ObjectId, SERVER_ID_START};

/// Client-side stand-in for a server object.
pub struct Proxy {
    id: ObjectId,
    interface: &'static Interface,
    version: u32,
    /// One slot per event, indexed by opcode.
    handlers: Vec<Option<EventHandler>>,
}

impl Proxy {
    /// Create a proxy with an empty handler table sized to the interface.
    #[must_use]
    pub fn new(id: ObjectId, interface: &'static Interface, version: u32) -> Self {
        let mut handlers = Vec::with_capacity(interface.events.len());
        handlers.resize_with(interface.events.len(), || None);
        Self {
            id,
            interface,
            version,
            handlers,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn interface(&self) -> &'static Interface {
        self.interface
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Install the handler for event `opcode`, replacing any previous one.
    ///
    /// Returns `false` if the interface has no such event.
    pub fn set_handler(&mut self, opcode: u16, handler: EventHandler) -> bool {
        match self.handlers.get_mut(usize::from(opcode)) {
            Some(slot) => {
                *slot = Some(handler);
                true
            }
            None => false,
        }
    }

    /// Whether a handler is installed for event `opcode`.
    #[must_use]
    pub fn has_handler(&self, opcode: u16) -> bool {
        matches!(self.handlers.get(usize::from(opcode)), Some(Some(_)))
    }

    pub(crate) fn take_handler(&mut self, opcode: u16) -> Option<EventHandler> {
        self.handlers.get_mut(usize::from(opcode))?.take()
    }

    /// Put a handler back after it ran, unless it was replaced meanwhile.
    pub(crate) fn restore_handler(&mut self, opcode: u16, handler: EventHandler) {
        if let Some(slot) = self.handlers.get_mut(usize::from(opcode)) {
            if slot.is_none() {
                *slot = Some(handler);
            }
        }
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id)
            .field("interface", &self.interface.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Result of resolving an incoming frame's target.
pub enum Lookup<'a> {
    Live(&'a mut Proxy),
    /// Pending deletion; the interface tells how many descriptors to discard.
    Dead(&'static Interface),
}

/// Id allocator plus the live table and dead set.
pub struct ObjectRegistry {
    next_id: ObjectId,
    free: VecDeque<ObjectId>,
    live: HashMap<ObjectId, Proxy>,
    dead: HashMap<ObjectId, &'static Interface>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            free: VecDeque::new(),
            live: HashMap::new(),
            dead: HashMap::new(),
        }
    }

    /// Hand out an id, reusing acknowledged ids before drawing new ones.
    pub fn allocate_id(&mut self) -> Result<ObjectId, ConnectionError> {
        if let Some(id) = self.free.pop_front() {
            return Ok(id);
        }
        if self.next_id >= SERVER_ID_START {
            return Err(ConnectionError::IdsExhausted);
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    /// Return an id that was allocated but never registered.
    pub(crate) fn release_unused(&mut self, id: ObjectId) {
        self.free.push_front(id);
    }

    /// Add a proxy to the live table.
    pub fn register(&mut self, proxy: Proxy) -> Result<(), ConnectionError> {
        let id = proxy.id();
        if id == 0 || self.live.contains_key(&id) || self.dead.contains_key(&id) {
            return Err(ConnectionError::DuplicateId(id));
        }
        self.live.insert(id, proxy);
        Ok(())
    }

    /// Retire a live id until the server acknowledges it.
    ///
    /// Returns the removed proxy, or `None` if the id was not live.
    pub fn mark_pending_delete(&mut self, id: ObjectId) -> Option<Proxy> {
        let proxy = self.live.remove(&id)?;
        self.dead.insert(id, proxy.interface());
        tracing::debug!(id, interface = proxy.interface().name, "object pending deletion");
        Some(proxy)
    }

    /// Record an id the server created on an object already pending
    /// deletion, so its frames are discarded too.
    pub(crate) fn mark_orphan(&mut self, id: ObjectId, interface: &'static Interface) {
        if !self.live.contains_key(&id) {
            self.dead.insert(id, interface);
            tracing::debug!(id, interface = interface.name, "orphaned server object ignored");
        }
    }

    /// Release an id after the server's `delete_id`.
    ///
    /// Live ids are released directly; this covers objects the server
    /// destroys on its own, such as callbacks. Returns `false` for ids the
    /// registry does not know.
    pub fn confirm_delete(&mut self, id: ObjectId) -> bool {
        let known = self.dead.remove(&id).is_some() | self.live.remove(&id).is_some();
        if !known {
            return false;
        }
        if id < SERVER_ID_START {
            self.free.push_back(id);
        }
        tracing::trace!(id, "object id released");
        true
    }

    /// Resolve the target of an incoming frame.
    pub fn lookup(&mut self, id: ObjectId) -> Result<Lookup<'_>, ConnectionError> {
        if let Some(interface) = self.dead.get(&id) {
            return Ok(Lookup::Dead(*interface));
        }
        self.live
            .get_mut(&id)
            .map(Lookup::Live)
            .ok_or(ConnectionError::UnknownObject(id))
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&Proxy> {
        self.live.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Proxy> {
        self.live.get_mut(&id)
    }

    #[must_use]
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.live.contains_key(&id)
    }

    #[must_use]
    pub fn is_dead(&self, id: ObjectId) -> bool {
        self.dead.contains_key(&id)
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler;
    use waylink_protocol::{WL_CALLBACK, WL_DISPLAY};

    fn callback(id: ObjectId) -> Proxy {
        Proxy::new(id, &WL_CALLBACK, 1)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut objects = ObjectRegistry::new();
        let ids: Vec<_> = (0..100).map(|_| objects.allocate_id().unwrap()).collect();

        assert_eq!(ids[0], 1);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_register_duplicate() {
        let mut objects = ObjectRegistry::new();
        objects.register(callback(3)).unwrap();
        assert!(matches!(
            objects.register(callback(3)),
            Err(ConnectionError::DuplicateId(3))
        ));
        assert!(matches!(
            objects.register(callback(0)),
            Err(ConnectionError::DuplicateId(0))
        ));
    }

    #[test]
    fn test_dead_id_not_reused_until_confirmed() {
        let mut objects = ObjectRegistry::new();
        let id = objects.allocate_id().unwrap();
        objects.register(callback(id)).unwrap();

        assert!(objects.mark_pending_delete(id).is_some());
        assert!(objects.is_dead(id));
        assert!(!objects.is_live(id));

        // A dead id is neither reallocated nor re-registrable.
        for _ in 0..10 {
            assert_ne!(objects.allocate_id().unwrap(), id);
        }
        assert!(objects.register(callback(id)).is_err());

        assert!(objects.confirm_delete(id));
        assert!(!objects.is_dead(id));
        assert_eq!(objects.allocate_id().unwrap(), id);
    }

    #[test]
    fn test_free_list_is_fifo() {
        let mut objects = ObjectRegistry::new();
        for id in 1..=4 {
            assert_eq!(objects.allocate_id().unwrap(), id);
            objects.register(callback(id)).unwrap();
        }
        objects.mark_pending_delete(3);
        objects.mark_pending_delete(2);
        objects.confirm_delete(3);
        objects.confirm_delete(2);

        assert_eq!(objects.allocate_id().unwrap(), 3);
        assert_eq!(objects.allocate_id().unwrap(), 2);
        assert_eq!(objects.allocate_id().unwrap(), 5);
    }

    #[test]
    fn test_unused_id_is_handed_out_next() {
        let mut objects = ObjectRegistry::new();
        let first = objects.allocate_id().unwrap();
        objects.release_unused(first);
        assert_eq!(objects.allocate_id().unwrap(), first);
        assert_eq!(objects.allocate_id().unwrap(), 2);
    }

    #[test]
    fn test_confirm_live_id_releases_it() {
        let mut objects = ObjectRegistry::new();
        objects.register(callback(1)).unwrap();

        assert!(objects.confirm_delete(1));
        assert!(!objects.is_live(1));
        assert_eq!(objects.allocate_id().unwrap(), 1);
    }

    #[test]
    fn test_confirm_unknown_id() {
        let mut objects = ObjectRegistry::new();
        assert!(!objects.confirm_delete(42));
        assert_eq!(objects.allocate_id().unwrap(), 1);
    }

    #[test]
    fn test_server_ids_are_not_recycled() {
        let mut objects = ObjectRegistry::new();
        let server_id = SERVER_ID_START + 1;
        objects.register(callback(server_id)).unwrap();

        assert!(objects.confirm_delete(server_id));
        assert_eq!(objects.allocate_id().unwrap(), 1);
    }

    #[test]
    fn test_lookup_states() {
        let mut objects = ObjectRegistry::new();
        objects.register(Proxy::new(1, &WL_DISPLAY, 1)).unwrap();
        objects.register(callback(2)).unwrap();
        objects.mark_pending_delete(2);

        assert!(matches!(objects.lookup(1), Ok(Lookup::Live(p)) if p.id() == 1));
        assert!(matches!(objects.lookup(2), Ok(Lookup::Dead(i)) if i.name == "wl_callback"));
        assert!(matches!(
            objects.lookup(9),
            Err(ConnectionError::UnknownObject(9))
        ));
    }

    #[test]
    fn test_handler_table_sized_to_interface() {
        let mut proxy = Proxy::new(1, &WL_DISPLAY, 1);
        assert!(proxy.set_handler(1, handler(|_, _| Ok(()))));
        assert!(!proxy.set_handler(2, handler(|_, _| Ok(()))));
        assert!(proxy.has_handler(1));
        assert!(!proxy.has_handler(0));

        let taken = proxy.take_handler(1).unwrap();
        assert!(!proxy.has_handler(1));
        proxy.restore_handler(1, taken);
        assert!(proxy.has_handler(1));
    }
}
