//! Seams to the outside world: ticket persistence and the chat platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ticket::{ChannelId, RequesterId, TicketDocument};
use crate::errors::ApplicationError;
use crate::messages::MessageTemplate;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("ticket store i/o failed: {0}")]
    Storage(String),
    #[error("ticket store document is malformed: {0}")]
    CorruptState(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Storage(message) => Self::Storage(message),
            StoreError::CorruptState(message) => Self::CorruptState(message),
        }
    }
}

/// Whole-document persistence for the ticket mapping.
///
/// `load` initializes and persists an empty document when nothing has been
/// stored yet. `save` replaces the full document; a concurrent reader must
/// observe either the previous or the new document, never a partial one.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn load(&self) -> Result<TicketDocument, StoreError>;
    async fn save(&self, document: &TicketDocument) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(String),
    #[error("gateway resource not found: {0}")]
    NotFound(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewChannel,
    SendMessages,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OverrideTarget {
    Role(String),
    Member(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    pub target: OverrideTarget,
    pub allow: Vec<Permission>,
    pub deny: Vec<Permission>,
}

impl PermissionOverride {
    pub fn allow(target: OverrideTarget, permissions: &[Permission]) -> Self {
        Self { target, allow: permissions.to_vec(), deny: Vec::new() }
    }

    pub fn deny(target: OverrideTarget, permissions: &[Permission]) -> Self {
        Self { target, allow: Vec::new(), deny: permissions.to_vec() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub guild_id: String,
    pub name: String,
    pub parent_category: Option<String>,
    pub permission_overrides: Vec<PermissionOverride>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub name: String,
}

/// Handle needed to answer an interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyVisibility {
    /// Visible only to the user who triggered the interaction.
    Private,
    Public,
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn create_text_channel(&self, request: &ChannelRequest)
        -> Result<ChannelRef, GatewayError>;

    /// Missing channels surface as `GatewayError::NotFound`; callers treat that as done.
    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), GatewayError>;

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<(), GatewayError>;

    async fn fetch_channel(&self, channel_id: &ChannelId)
        -> Result<Option<ChannelRef>, GatewayError>;

    async fn reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
        visibility: ReplyVisibility,
    ) -> Result<(), GatewayError>;
}

pub fn member_target(requester_id: &RequesterId) -> OverrideTarget {
    OverrideTarget::Member(requester_id.0.clone())
}
