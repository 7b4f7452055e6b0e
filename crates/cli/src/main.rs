//! waylink
//!
//! A small inspector for Wayland display servers, built on the waylink
//! client engine.

mod cli;
mod config;
mod interfaces;
mod watch;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::{Result, bail};
use config::Config;
use interfaces::Details;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use waylink_client::Connection;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?
        .with_log_level(cli.log_level.clone())
        .with_display(cli.display.clone())
        .with_socket(cli.socket.clone());

    init_logging(&config.log_level)?;

    match cli.command {
        Command::Globals => cmd_globals(&config),
        Command::Roundtrip { count } => cmd_roundtrip(&config, count),
        Command::Watch => {
            let conn = Connection::connect(&config.connection, Vec::new())?;
            watch::run(conn).await
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn cmd_globals(config: &Config) -> Result<()> {
    let mut conn = Connection::connect(&config.connection, interfaces::templates())?;

    // Bound objects send their initial state after the bind is processed.
    let details = Rc::new(RefCell::new(Details::default()));
    interfaces::collect_details(&mut conn, &details)?;
    conn.roundtrip()?;

    println!("{:>5}  {:<40} {:>7}  bound", "name", "interface", "version");
    for record in conn.globals().advertised() {
        let bound = record
            .bound
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        println!(
            "{:>5}  {:<40} {:>7}  {bound}",
            record.name, record.interface, record.version
        );
        if let Some(id) = record.bound {
            for line in details.borrow().lines(id) {
                println!("{:>7}{line}", "");
            }
        }
    }

    conn.disconnect();
    Ok(())
}

fn cmd_roundtrip(config: &Config, count: u32) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }

    let mut conn = Connection::connect(&config.connection, Vec::new())?;

    let mut timings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let started = Instant::now();
        conn.roundtrip()?;
        timings.push(started.elapsed());
    }

    let stats = RoundtripStats::from_timings(&timings);
    println!(
        "{count} roundtrips: min {:?}, mean {:?}, max {:?}",
        stats.min, stats.mean, stats.max
    );

    conn.disconnect();
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct RoundtripStats {
    min: Duration,
    mean: Duration,
    max: Duration,
}

impl RoundtripStats {
    fn from_timings(timings: &[Duration]) -> Self {
        let total: Duration = timings.iter().sum();
        Self {
            min: timings.iter().min().copied().unwrap_or_default(),
            mean: total / timings.len().max(1) as u32,
            max: timings.iter().max().copied().unwrap_or_default(),
        }
    }
}
