use anyhow::{Context, Result};
use prefix_proxy::app::App;
use prefix_proxy::config::AppConfig;
use prefix_proxy::logging;
use std::path::Path;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // aws-lc-rs backs both the listener and the backend clients
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("A rustls crypto provider is already installed"))?;

    // Logging settings come from the config file, so it is read first
    let config_path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config_present = Path::new(&config_path).exists();
    let mut config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    config
        .apply_env_overrides()
        .context("Invalid HOST/PORT environment override")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    let _guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging system")?;

    info!(
        "Logging initialized - level: {}, file: {:?}, json: {}",
        config.logging.level, config.logging.file, config.logging.json
    );
    if !config_present {
        warn!("No config file at {}, using built-in defaults", config_path);
    }

    // Certificate or bind failures abort here
    let mut app = App::new(config);
    if let Err(e) = app.start().await {
        tracing::error!("Failed to start proxy: {:#}", e);
        return Err(e);
    }

    if let Some(addr) = app.local_addr() {
        info!("[Ready] Listening on {}", addr);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C")?;

    info!("Ctrl+C received, stopping listeners");
    app.wait_for_shutdown().await;

    Ok(())
}
