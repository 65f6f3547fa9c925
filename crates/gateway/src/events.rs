use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use ticketdesk_core::{
    domain::ticket::{ChannelId, RequesterId},
    errors::ApplicationError,
    lifecycle::{CloseTicketRequest, OpenTicketRequest, TicketLifecycle},
    messages::{CLOSE_TICKET_ACTION, OPEN_TICKET_ACTION},
    ports::InteractionRef,
};

use crate::commands::{parse_admin_command, AdminCommand};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub envelope_id: String,
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    ButtonInteraction(ButtonInteractionEvent),
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::ButtonInteraction(_) => GatewayEventType::ButtonInteraction,
            Self::Message(_) => GatewayEventType::Message,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    ButtonInteraction,
    Message,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonInteractionEvent {
    pub interaction_id: String,
    pub interaction_token: String,
    pub custom_id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub guild_id: String,
}

impl ButtonInteractionEvent {
    fn interaction(&self) -> InteractionRef {
        InteractionRef { id: self.interaction_id.clone(), token: self.interaction_token.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub author_id: String,
    pub author_is_admin: bool,
    pub author_is_bot: bool,
    pub content: String,
    pub channel_id: String,
    pub guild_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    /// The request was refused on business grounds and the user was told so.
    Rejected,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Lifecycle(#[from] ApplicationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn ticket_dispatcher(
    lifecycle: Arc<TicketLifecycle>,
    panel_command: impl Into<String>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ButtonInteractionHandler::new(lifecycle.clone()));
    dispatcher.register(AdminMessageHandler::new(lifecycle, panel_command));
    dispatcher
}

pub struct ButtonInteractionHandler {
    lifecycle: Arc<TicketLifecycle>,
}

impl ButtonInteractionHandler {
    pub fn new(lifecycle: Arc<TicketLifecycle>) -> Self {
        Self { lifecycle }
    }

    async fn open(
        &self,
        event: &ButtonInteractionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let request = OpenTicketRequest {
            interaction: event.interaction(),
            correlation_id: ctx.correlation_id.clone(),
            guild_id: event.guild_id.clone(),
            requester_id: RequesterId::new(event.actor_id.clone()),
            requester_name: event.actor_name.clone(),
        };

        match self.lifecycle.open_ticket(&request).await {
            Ok(outcome) => {
                info!(
                    event_name = "ticket.open.completed",
                    correlation_id = %ctx.correlation_id,
                    requester_id = %outcome.record.requester_id,
                    channel_id = %outcome.record.channel_id,
                    "ticket opened"
                );
                Ok(HandlerResult::Processed)
            }
            Err(error) if error.is_rejection() => Ok(HandlerResult::Rejected),
            Err(error) => Err(error.into()),
        }
    }

    async fn close(
        &self,
        event: &ButtonInteractionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let request = CloseTicketRequest {
            interaction: event.interaction(),
            correlation_id: ctx.correlation_id.clone(),
            actor_id: RequesterId::new(event.actor_id.clone()),
            channel_id: ChannelId::new(event.channel_id.clone()),
            channel_name: event.channel_name.clone(),
        };

        let outcome = self.lifecycle.close_ticket(&request).await?;
        info!(
            event_name = "ticket.close.completed",
            correlation_id = %ctx.correlation_id,
            channel_id = %outcome.channel_id,
            tracked = outcome.released.is_some(),
            audit_delivered = outcome.audit_delivered,
            "ticket closed; channel deletion scheduled"
        );
        Ok(HandlerResult::Processed)
    }
}

#[async_trait]
impl EventHandler for ButtonInteractionHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ButtonInteraction
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ButtonInteraction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match event.custom_id.as_str() {
            OPEN_TICKET_ACTION => self.open(event, ctx).await,
            CLOSE_TICKET_ACTION => self.close(event, ctx).await,
            _ => Ok(HandlerResult::Ignored),
        }
    }
}

pub struct AdminMessageHandler {
    lifecycle: Arc<TicketLifecycle>,
    panel_command: String,
}

impl AdminMessageHandler {
    pub fn new(lifecycle: Arc<TicketLifecycle>, panel_command: impl Into<String>) -> Self {
        Self { lifecycle, panel_command: panel_command.into() }
    }
}

#[async_trait]
impl EventHandler for AdminMessageHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::Message
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match parse_admin_command(event, &self.panel_command) {
            Some(AdminCommand::PostPanel) => {
                self.lifecycle.post_panel(&ChannelId::new(event.channel_id.clone())).await?;
                info!(
                    event_name = "ticket.panel.posted",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %event.channel_id,
                    author_id = %event.author_id,
                    "ticket panel posted"
                );
                Ok(HandlerResult::Processed)
            }
            None => Ok(HandlerResult::Ignored),
        }
    }
}
