//! Registry globals: what the server advertises and what the client bound.

use crate::connection::Connection;
use crate::dispatch::Event;
use crate::error::ConnectionError;
use std::collections::{BTreeMap, HashMap};
use waylink_protocol::{Argument, Interface, ObjectId, WL_REGISTRY};

/// An interface the client wants bound whenever the server advertises it.
#[derive(Debug, Clone, Copy)]
pub struct GlobalTemplate {
    pub interface: &'static Interface,
    /// Highest version the client understands.
    pub max_version: u32,
    /// Argument-less destructor request sent when the global goes away.
    pub destructor: Option<u16>,
}

impl GlobalTemplate {
    /// Bind `interface` at up to its descriptor's version.
    #[must_use]
    pub fn new(interface: &'static Interface) -> Self {
        Self {
            interface,
            max_version: interface.version,
            destructor: None,
        }
    }

    #[must_use]
    pub fn with_max_version(mut self, max_version: u32) -> Self {
        self.max_version = max_version;
        self
    }

    /// Destroy bound objects with request `opcode` on `global_remove`.
    #[must_use]
    pub fn with_destructor(mut self, opcode: u16) -> Self {
        self.destructor = Some(opcode);
        self
    }
}

/// One advertised global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRecord {
    /// Server-assigned global name.
    pub name: u32,
    pub interface: String,
    /// Version the server advertised.
    pub version: u32,
    /// Client object bound to it, if a template matched.
    pub bound: Option<ObjectId>,
}

/// Objects bound for one interface name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalSlot {
    Single(ObjectId),
    /// Several globals of the same interface, in advertisement order.
    Many(Vec<ObjectId>),
}

impl GlobalSlot {
    #[must_use]
    pub fn ids(&self) -> &[ObjectId] {
        match self {
            Self::Single(id) => std::slice::from_ref(id),
            Self::Many(ids) => ids,
        }
    }

    #[must_use]
    pub fn first(&self) -> ObjectId {
        self.ids()[0]
    }
}

/// Advertised globals and the bindings made for them.
#[derive(Debug, Default)]
pub struct Globals {
    advertised: BTreeMap<u32, GlobalRecord>,
    bound: HashMap<String, GlobalSlot>,
}

impl Globals {
    /// Bindings for `interface`.
    #[must_use]
    pub fn get(&self, interface: &str) -> Option<&GlobalSlot> {
        self.bound.get(interface)
    }

    /// First object bound for `interface`.
    #[must_use]
    pub fn first(&self, interface: &str) -> Option<ObjectId> {
        self.get(interface).map(GlobalSlot::first)
    }

    /// Advertised global by name.
    #[must_use]
    pub fn record(&self, name: u32) -> Option<&GlobalRecord> {
        self.advertised.get(&name)
    }

    /// Every advertised global, ordered by name.
    pub fn advertised(&self) -> impl Iterator<Item = &GlobalRecord> {
        self.advertised.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.advertised.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.advertised.is_empty()
    }

    fn add_binding(&mut self, interface: &str, id: ObjectId) {
        match self.bound.get_mut(interface) {
            None => {
                self.bound
                    .insert(interface.to_string(), GlobalSlot::Single(id));
            }
            Some(slot) => {
                let mut ids = slot.ids().to_vec();
                ids.push(id);
                *slot = GlobalSlot::Many(ids);
            }
        }
    }

    fn remove_binding(&mut self, interface: &str, id: ObjectId) {
        let Some(slot) = self.bound.get_mut(interface) else {
            return;
        };
        let ids: Vec<_> = slot.ids().iter().copied().filter(|&x| x != id).collect();
        match ids.len() {
            0 => {
                self.bound.remove(interface);
            }
            1 => *slot = GlobalSlot::Single(ids[0]),
            _ => *slot = GlobalSlot::Many(ids),
        }
    }
}

/// `wl_registry.global`: record the global and bind it if a template matches.
pub(crate) fn handle_global(conn: &mut Connection, event: Event) -> Result<(), ConnectionError> {
    let [
        Argument::Uint(name),
        Argument::Str(interface),
        Argument::Uint(version),
    ] = event.args.as_slice()
    else {
        return Err(ConnectionError::UnexpectedArguments {
            interface: WL_REGISTRY.name,
            event: "global",
        });
    };

    let template = conn
        .templates
        .iter()
        .find(|t| t.interface.name == interface)
        .copied();
    let bound = match template {
        Some(template) => {
            let version = (*version).min(template.max_version);
            let id = conn.bind(*name, template.interface, version)?;
            conn.globals.add_binding(interface, id);
            Some(id)
        }
        None => {
            tracing::trace!(name, interface = %interface, version, "global advertised");
            None
        }
    };

    conn.globals.advertised.insert(
        *name,
        GlobalRecord {
            name: *name,
            interface: interface.clone(),
            version: *version,
            bound,
        },
    );
    Ok(())
}

/// `wl_registry.global_remove`: drop the record and retire any bound object.
///
/// The server acknowledges an id only after the client destroys it. When
/// the template names a destructor it is sent here and the later
/// `delete_id` frees the id; otherwise the id stays in the dead set for the
/// life of the connection.
pub(crate) fn handle_global_remove(
    conn: &mut Connection,
    event: Event,
) -> Result<(), ConnectionError> {
    let [Argument::Uint(name)] = event.args.as_slice() else {
        return Err(ConnectionError::UnexpectedArguments {
            interface: WL_REGISTRY.name,
            event: "global_remove",
        });
    };

    let Some(record) = conn.globals.advertised.remove(name) else {
        tracing::debug!(name, "global_remove for unknown global ignored");
        return Ok(());
    };
    if let Some(id) = record.bound {
        conn.globals.remove_binding(&record.interface, id);
        let destructor = conn
            .templates
            .iter()
            .find(|t| t.interface.name == record.interface)
            .and_then(|t| t.destructor);
        let sent = destructor
            .map(|opcode| conn.send_request(id, opcode, Vec::new()))
            .transpose();
        conn.objects.mark_pending_delete(id);
        sent?;
    }
    tracing::debug!(name, interface = %record.interface, "global removed");
    Ok(())
}
