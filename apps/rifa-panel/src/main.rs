use anyhow::Result;
use clap::Parser;
use rifa_panel::cli::{self, Cli};
use rifa_panel::config::PanelConfig;
use rifa_panel::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = PanelConfig::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("rifa-panel v{} ({:?} store)", env!("CARGO_PKG_VERSION"), config.storage);
    tracing::info!("Loaded config from {}", config.source);
    let state = AppState::connect(config).await?;
    cli::run(&state, cli.command).await
}
