//! Socket path helpers for locating the display server.

use std::path::{Path, PathBuf};

/// Display name used when `WAYLAND_DISPLAY` is unset.
pub const DEFAULT_DISPLAY: &str = "wayland-0";

/// Environment variable naming the display socket.
pub const DISPLAY_ENV_VAR: &str = "WAYLAND_DISPLAY";

/// Environment variable naming the per-user runtime directory.
pub const RUNTIME_DIR_ENV_VAR: &str = "XDG_RUNTIME_DIR";

/// Get the display name to connect to.
///
/// Checks the `WAYLAND_DISPLAY` environment variable first,
/// falling back to `wayland-0`.
#[must_use]
pub fn get_display_name() -> String {
    std::env::var(DISPLAY_ENV_VAR)
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_DISPLAY.to_string())
}

/// Join a display name onto the runtime directory.
///
/// Absolute display names are used as-is. Returns `None` when the name is
/// relative and no runtime directory is known.
#[must_use]
pub fn resolve_socket_path(display: &str, runtime_dir: Option<&Path>) -> Option<PathBuf> {
    let display = Path::new(display);
    if display.is_absolute() {
        return Some(display.to_path_buf());
    }
    runtime_dir.map(|dir| dir.join(display))
}

/// Get the socket path to use for the connection.
///
/// Resolution order:
/// 1. `display` argument, if given
/// 2. `WAYLAND_DISPLAY` environment variable
/// 3. Default: `wayland-0`
///
/// Relative names are resolved against `$XDG_RUNTIME_DIR`.
#[must_use]
pub fn get_socket_path(display: Option<&str>) -> Option<PathBuf> {
    let display = display.map_or_else(get_display_name, str::to_string);
    let runtime_dir = std::env::var_os(RUNTIME_DIR_ENV_VAR)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);
    resolve_socket_path(&display, runtime_dir.as_deref())
}
