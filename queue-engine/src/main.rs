//! Binary entry point: loads configuration, initializes logging, builds
//! an `Engine` with the built-in providers, and runs until interrupted.
//!
//! No chat-platform binding lives here. This binary exists to make the
//! queue engine independently runnable and inspectable; a front-end
//! (bot gateway) attaches by constructing its own `VoiceTransport` and
//! calling `Engine::submit`/`skip`/`stop` from its command handlers.

use std::sync::Arc;

use clap::Parser;
use queue_core::{build_default_registry, Config, Engine, FakeVoiceTransport, VoiceSessionManager};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "queue-engine", about = "Per-guild audio queue orchestration engine")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "ENGINE_CONFIG")]
    config: Option<String>,

    /// Override the persisted-snapshot directory.
    #[arg(long, env = "ENGINE_DATA_DIR")]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.persistence.data_dir = data_dir;
    }

    queue_core::logging::init_logging(&config.logging)?;

    let registry = build_default_registry(&config.providers);
    let voice = VoiceSessionManager::new(Arc::new(FakeVoiceTransport::new()));

    let engine = Engine::new(config, registry, voice);
    engine.start().await?;
    info!("engine started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    engine.shutdown().await?;

    Ok(())
}
