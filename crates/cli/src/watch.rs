//! The `watch` command: follow registry changes until interrupted.
//!
//! The connection stays single-threaded; tokio only reports when its socket
//! is readable, and the engine's non-blocking `read_events` does the rest.

use color_eyre::eyre::{Result, eyre};
use std::collections::BTreeMap;
use std::os::fd::RawFd;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{SignalKind, signal};
use waylink_client::{Connection, GlobalRecord};

/// A difference between two registry snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalChange {
    Added(GlobalRecord),
    Removed(GlobalRecord),
}

impl std::fmt::Display for GlobalChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (sign, record) = match self {
            Self::Added(record) => ('+', record),
            Self::Removed(record) => ('-', record),
        };
        write!(
            f,
            "{sign} {:>4} {} v{}",
            record.name, record.interface, record.version
        )
    }
}

pub type Snapshot = BTreeMap<u32, GlobalRecord>;

/// Current globals keyed by name.
pub fn snapshot(conn: &Connection) -> Snapshot {
    conn.globals()
        .advertised()
        .map(|record| (record.name, record.clone()))
        .collect()
}

/// Changes that turn `before` into `after`: removals first, then additions,
/// each ordered by name.
pub fn diff(before: &Snapshot, after: &Snapshot) -> Vec<GlobalChange> {
    let removed = before
        .iter()
        .filter(|(name, record)| after.get(*name) != Some(*record))
        .map(|(_, record)| GlobalChange::Removed(record.clone()));
    let added = after
        .iter()
        .filter(|(name, record)| before.get(*name) != Some(*record))
        .map(|(_, record)| GlobalChange::Added(record.clone()));
    removed.chain(added).collect()
}

/// Print the current globals, then every change until SIGINT or SIGTERM.
pub async fn run(mut conn: Connection) -> Result<()> {
    let fd: RawFd = conn
        .raw_fd()
        .ok_or_else(|| eyre!("connection has no socket descriptor"))?;
    let readiness = AsyncFd::with_interest(fd, Interest::READABLE)?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut known = snapshot(&conn);
    for change in diff(&Snapshot::new(), &known) {
        println!("{change}");
    }

    loop {
        tokio::select! {
            guard = readiness.readable() => {
                let mut guard = guard?;
                while conn.read_events()?.is_some() {}
                guard.clear_ready();

                conn.dispatch_pending()?;
                conn.flush()?;

                let current = snapshot(&conn);
                for change in diff(&known, &current) {
                    println!("{change}");
                }
                known = current;
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                break;
            }
        }
    }

    conn.disconnect();
    Ok(())
}
