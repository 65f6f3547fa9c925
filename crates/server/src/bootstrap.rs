use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use ticketdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use ticketdesk_core::lifecycle::{TicketLifecycle, TicketSettings};
use ticketdesk_core::ports::{GatewayError, StoreError, TicketStore};
use ticketdesk_gateway::{
    ticket_dispatcher, GatewayRunner, NoopGatewayTransport, ReconnectPolicy, RestChatGateway,
};
use ticketdesk_store::JsonFileTicketStore;

pub struct Application {
    pub config: AppConfig,
    pub lifecycle: Arc<TicketLifecycle>,
    pub runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("ticket store is not usable: {0}")]
    Store(#[source] StoreError),
    #[error("gateway client could not be created: {0}")]
    Gateway(#[source] GatewayError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let store: Arc<dyn TicketStore> =
        Arc::new(JsonFileTicketStore::new(config.tickets.store_path.clone()));
    // A malformed document must stop startup rather than be overwritten later.
    let document = store.load().await.map_err(BootstrapError::Store)?;
    info!(
        event_name = "system.bootstrap.store_loaded",
        correlation_id = "bootstrap",
        store_path = %config.tickets.store_path.display(),
        open_tickets = document.len(),
        "ticket store loaded"
    );

    let gateway =
        Arc::new(RestChatGateway::from_config(&config.gateway).map_err(BootstrapError::Gateway)?);
    let lifecycle = Arc::new(TicketLifecycle::new(
        store,
        gateway,
        TicketSettings::from(&config.tickets),
    ));

    let runner = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        ticket_dispatcher(lifecycle.clone(), config.tickets.panel_command.clone()),
        ReconnectPolicy::default(),
    );

    Ok(Application { config, lifecycle, runner })
}
