use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::ticket::ChannelId;
use crate::errors::ApplicationError;
use crate::ports::{ChatGateway, GatewayError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeletionOutcome {
    Deleted,
    AlreadyGone,
    Failed(String),
}

/// Channel deletion running in the background after the grace delay.
///
/// There is no cancellation path. Dropping this value detaches the task; it
/// still fires at `deadline`.
#[derive(Debug)]
pub struct ScheduledDeletion {
    pub channel_id: ChannelId,
    pub deadline: Instant,
    handle: JoinHandle<DeletionOutcome>,
}

impl ScheduledDeletion {
    pub async fn join(self) -> DeletionOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(error) => DeletionOutcome::Failed(format!("deletion task did not complete: {error}")),
        }
    }
}

pub fn schedule_deletion(
    gateway: Arc<dyn ChatGateway>,
    channel_id: ChannelId,
    grace: Duration,
    correlation_id: String,
) -> ScheduledDeletion {
    let deadline = Instant::now() + grace;
    let target = channel_id.clone();

    let handle = tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;

        match gateway.delete_channel(&target).await {
            Ok(()) => {
                info!(
                    event_name = "ticket.close.channel_deleted",
                    correlation_id = %correlation_id,
                    channel_id = %target,
                    "ticket channel deleted"
                );
                DeletionOutcome::Deleted
            }
            Err(GatewayError::NotFound(_)) => {
                debug!(
                    event_name = "ticket.close.channel_already_gone",
                    correlation_id = %correlation_id,
                    channel_id = %target,
                    "ticket channel was already deleted"
                );
                DeletionOutcome::AlreadyGone
            }
            Err(error) => {
                let error = ApplicationError::ChannelDeletion(error.to_string());
                warn!(
                    event_name = "ticket.close.channel_delete_failed",
                    correlation_id = %correlation_id,
                    channel_id = %target,
                    error = %error,
                    "ticket channel deletion failed; ignoring"
                );
                DeletionOutcome::Failed(error.to_string())
            }
        }
    });

    ScheduledDeletion { channel_id, deadline, handle }
}
