use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ticket::{ChannelId, RequesterId};

/// Audit entry delivered to the configured log channel when a ticket closes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_type: String,
    pub correlation_id: String,
    pub actor_id: RequesterId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    /// Owner of the ticket, when the channel was still tracked at close time.
    pub requester_id: Option<RequesterId>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn ticket_closed(
        correlation_id: impl Into<String>,
        actor_id: RequesterId,
        channel_id: ChannelId,
        channel_name: impl Into<String>,
        requester_id: Option<RequesterId>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: "ticket.closed".to_owned(),
            correlation_id: correlation_id.into(),
            actor_id,
            channel_id,
            channel_name: channel_name.into(),
            requester_id,
            occurred_at: Utc::now(),
        }
    }
}
