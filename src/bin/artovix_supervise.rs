//! Keeps the bot process running: launch, wait, log, sleep, relaunch.

use anyhow::{bail, Result};
use artovix_bot::supervisor::Supervisor;
use tracing_subscriber::{prelude::*, EnvFilter};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(program) = args.next() else {
        bail!("usage: artovix-supervise <program> [args...]");
    };
    let rest: Vec<String> = args.collect();

    // Runs until killed externally; every child exit is restarted.
    Supervisor::new(program, rest, "supervisor.log")?.run()
}
