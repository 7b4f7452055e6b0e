//! waylink client - a single-threaded Wayland client protocol engine.
//!
//! The engine speaks the display wire protocol over a Unix stream socket:
//!
//! 1. [`Connection::connect`] locates the socket, registers the display
//!    object, requests the registry and waits for one roundtrip
//! 2. Globals matching a [`GlobalTemplate`] are bound as they are advertised
//! 3. The caller installs handlers and drives [`Connection::dispatch_once`]
//!    (or [`Connection::read_events`] from an external poller)
//!
//! # Object lifetime
//!
//! Destroying an object retires its id: frames still in flight for it are
//! discarded, and the id is only reused after the server's `delete_id`.
//!
//! # Example
//!
//! ```no_run
//! use waylink_client::{Connection, ConnectionConfig};
//!
//! let mut conn = Connection::connect(&ConnectionConfig::default(), Vec::new())?;
//! for global in conn.globals().advertised() {
//!     println!("{} {} v{}", global.name, global.interface, global.version);
//! }
//! conn.roundtrip()?;
//! # Ok::<(), waylink_client::ConnectionError>(())
//! ```

mod config;
mod connection;
mod dispatch;
mod error;
mod globals;
mod objects;
mod socket;
mod transport;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use dispatch::{Event, EventHandler, EventQueue, decode_frames, handler};
pub use error::ConnectionError;
pub use globals::{GlobalRecord, GlobalSlot, GlobalTemplate, Globals};
pub use objects::{Lookup, ObjectRegistry, Proxy};
pub use socket::{MAX_FDS_PER_RECV, Socket};
pub use transport::Transport;

// The protocol crate is part of this crate's API.
pub use waylink_protocol as protocol;
