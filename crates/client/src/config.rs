//! Connection settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How to reach the display server and how to read from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Explicit socket path; overrides `display`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,

    /// Display name override (defaults to `$WAYLAND_DISPLAY`, then `wayland-0`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Bytes requested per receive call
    #[serde(default = "default_recv_chunk_size")]
    pub recv_chunk_size: usize,
}

fn default_recv_chunk_size() -> usize {
    4096
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket: None,
            display: None,
            recv_chunk_size: default_recv_chunk_size(),
        }
    }
}

impl ConnectionConfig {
    /// Override the socket path
    pub fn with_socket(mut self, socket: Option<PathBuf>) -> Self {
        if let Some(s) = socket {
            self.socket = Some(s);
        }
        self
    }

    /// Override the display name
    pub fn with_display(mut self, display: Option<String>) -> Self {
        if let Some(d) = display {
            self.display = Some(d);
        }
        self
    }

    /// Path of the socket to connect to, or `None` if it cannot be determined.
    pub fn socket_path(&self) -> Option<PathBuf> {
        match &self.socket {
            Some(path) => Some(path.clone()),
            None => waylink_protocol::get_socket_path(self.display.as_deref()),
        }
    }
}
