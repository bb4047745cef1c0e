//! testbridge: smart-door adapter entry point.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Args / env / --config ──▶ AdapterConfig (validated)    │
//! │                                                         │
//! │  WebSocketConnector ──▶ Engine ◀── SmartDoorHandler     │
//! │  (control plane)          │         (device connection) │
//! │                     LogEventSink                        │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use testbridge::Engine;
use testbridge::adapters::smartdoor::SmartDoorHandler;
use testbridge::config::AdapterConfig;
use testbridge::connection::websocket::WebSocketConnector;

#[derive(Parser)]
#[command(name = "testbridge", version)]
#[command(about = "Bridge a test-orchestration control plane to a smart-door SUT")]
struct Args {
    /// Adapter name published in the announcement
    #[arg(long, env = "TESTBRIDGE_NAME")]
    name: Option<String>,

    /// Control-plane WebSocket URL
    #[arg(long, env = "TESTBRIDGE_URL")]
    url: Option<String>,

    /// Bearer token for the control plane
    #[arg(long, env = "TESTBRIDGE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Pause before each reconnect, in milliseconds
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// JSON config file; flags and environment override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn resolve(&self) -> Result<AdapterConfig> {
        let mut config = match &self.config {
            Some(path) => AdapterConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AdapterConfig::default(),
        };
        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(url) = &self.url {
            config.url.clone_from(url);
        }
        if let Some(token) = &self.token {
            config.token.clone_from(token);
        }
        if let Some(delay) = self.reconnect_delay_ms {
            config.reconnect_delay_ms = delay;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = args.resolve()?;
    info!("testbridge v{} | adapter '{}'", env!("CARGO_PKG_VERSION"), config.name);
    info!("control plane: {}", config.url);

    let control = WebSocketConnector::new(&config.url).with_token(&config.token);
    let engine = Engine::builder(&config.name, control, SmartDoorHandler::new())
        .reconnect_delay(config.reconnect_delay())
        .build();
    engine.start().context("starting engine")?;

    // The engine runs on its own threads and reconnects forever.
    loop {
        std::thread::park();
    }
}
