use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use ticketdesk_core::lifecycle::{TicketLifecycle, TicketRegistry};

#[derive(Clone)]
pub struct HealthState {
    lifecycle: Arc<TicketLifecycle>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(lifecycle: Arc<TicketLifecycle>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { lifecycle })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    lifecycle: Arc<TicketLifecycle>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(lifecycle)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(state.lifecycle.registry()).await;
    let ready = store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "ticketdesk-server runtime initialized".to_string(),
        },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Reads through the registry so the check queues behind in-flight ticket
/// writes instead of touching the file alongside them.
async fn store_check(registry: &TicketRegistry) -> HealthCheck {
    match registry.load().await {
        Ok(document) => HealthCheck {
            status: "ready",
            detail: format!("ticket store readable; {} open ticket(s)", document.len()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("ticket store load failed: {error}") }
        }
    }
}
