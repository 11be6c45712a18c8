//! glyphcast-server binary entry point: parses the CLI, wires a ctrl-c
//! handler to the shutdown flag [`glyphcast_server::lifecycle::run_server`]
//! polls, and runs the accept loop on the main thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use glyphcast_server::{run_server, ServerConfig};

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("glyphcast-server v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log::info!("received interrupt, shutting down");
        handler_flag.store(true, Ordering::Release);
    })?;

    run_server(config, shutdown)?;

    log::info!("glyphcast-server exiting");
    Ok(())
}
