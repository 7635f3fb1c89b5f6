//! Sensorcast Server
//!
//! Run with: cargo run --bin sensorcast -- [--config PATH] [--debug]
//!
//! # Configuration
//!
//! Settings come from the first config file found (`--config`, then
//! `~/.config/sensorcast/config.toml`, `/etc/sensorcast/config.toml`,
//! `./config.toml`), then `SENSORCAST_*` environment variables, then the
//! flags below. `RUST_LOG` overrides `logging.level`.

use clap::Parser;
use std::path::PathBuf;

use sensorcast::{api, logging, plugins, Config, ServerCore};

#[derive(Parser)]
#[command(name = "sensorcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time sensor monitoring server")]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug mode: mounts GET /EXIT
    #[arg(long)]
    debug: bool,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let debug = args.debug || config.server.debug;

    logging::init(&config.logging);

    tracing::info!("Starting Sensorcast v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        source = ?config.sensors.source,
        default_topic = %config.sensors.default_topic,
        plugins = ?config.plugins.enabled,
        "Configuration loaded"
    );

    let addr = config.server.addr();
    let descriptors = plugins::from_config(&config);
    let startup = ServerCore::new(config)?.on_startup(descriptors, debug);

    for failed in startup.plugins.failed() {
        tracing::warn!(plugin = %failed.name, error = %failed.error, "Plugin not loaded");
    }

    let shutdown = startup.state.shutdown.clone();
    let result = api::serve(startup.router.clone(), &addr, shutdown).await;

    startup.stop();
    tracing::info!("Sensorcast stopped");

    result.map_err(Into::into)
}
