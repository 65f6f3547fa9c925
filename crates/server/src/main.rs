mod bootstrap;
mod health;

use anyhow::Result;
use ticketdesk_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use ticketdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging depends on the loaded config, so it comes first.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.lifecycle.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        close_grace_secs = app.lifecycle.settings().close_grace.as_secs(),
        log_channel_configured = app.lifecycle.settings().log_channel_id.is_some(),
        "ticketdesk-server started"
    );
    let summary = app.runner.start().await?;
    tracing::info!(
        event_name = "system.server.inbound_idle",
        correlation_id = "bootstrap",
        sessions = summary.sessions,
        processed = summary.processed,
        rejected = summary.rejected,
        failed = summary.failed,
        "inbound gateway loop finished; outbound calls and health stay available"
    );

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "ticketdesk-server stopping; pending channel deletions are abandoned"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
