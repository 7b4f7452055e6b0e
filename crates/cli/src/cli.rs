//! Command-line interface for waylink.
//!
//! Provides commands for inspecting a running display server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// waylink - inspect a Wayland display server over its wire protocol
#[derive(Debug, Parser)]
#[command(name = "waylink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "WAYLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Display name, e.g. wayland-1 (defaults to $WAYLAND_DISPLAY)
    #[arg(short, long, global = true)]
    pub display: Option<String>,

    /// Socket path; overrides --display
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List advertised globals and describe the ones waylink understands
    Globals,

    /// Time a series of sync roundtrips
    Roundtrip {
        /// Number of roundtrips
        #[arg(short = 'n', long, default_value = "10")]
        count: u32,
    },

    /// Print globals as they are added and removed
    Watch,
}
