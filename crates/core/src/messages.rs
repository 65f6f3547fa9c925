use std::time::Duration;

use serde::Serialize;

use crate::audit::AuditEvent;
use crate::domain::ticket::{ChannelId, RequesterId};

pub const OPEN_TICKET_ACTION: &str = "open_ticket";
pub const CLOSE_TICKET_ACTION: &str = "close_ticket";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

impl ButtonElement {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { custom_id: custom_id.into(), label: label.into(), style: ButtonStyle::Primary }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub buttons: Vec<ButtonElement>,
}

impl MessageTemplate {
    /// Plain-text rendering used for logs and tests.
    pub fn fallback_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(content) = &self.content {
            parts.push(content.clone());
        }
        for embed in &self.embeds {
            parts.push(format!("{}: {}", embed.title, embed.description));
        }
        parts.join("\n")
    }

    pub fn has_button(&self, custom_id: &str) -> bool {
        self.buttons.iter().any(|button| button.custom_id == custom_id)
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
    buttons: Vec<ButtonElement>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn embed(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.embeds.push(Embed { title: title.into(), description: description.into() });
        self
    }

    pub fn button(mut self, button: ButtonElement) -> Self {
        self.buttons.push(button);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { content: self.content, embeds: self.embeds, buttons: self.buttons }
    }
}

pub fn user_mention(requester_id: &RequesterId) -> String {
    format!("<@{requester_id}>")
}

pub fn channel_mention(channel_id: &ChannelId) -> String {
    format!("<#{channel_id}>")
}

pub fn ticket_panel_message() -> MessageTemplate {
    MessageBuilder::new()
        .embed(
            "Support tickets",
            "Press the button below to open a private support ticket.\nStaff will respond as soon as possible.",
        )
        .button(ButtonElement::new(OPEN_TICKET_ACTION, "Open ticket").style(ButtonStyle::Danger))
        .build()
}

pub fn welcome_message(requester_id: &RequesterId) -> MessageTemplate {
    MessageBuilder::new()
        .content(user_mention(requester_id))
        .embed("Ticket opened", "Please describe your issue.\nStaff will be with you shortly.")
        .button(
            ButtonElement::new(CLOSE_TICKET_ACTION, "Close ticket").style(ButtonStyle::Secondary),
        )
        .build()
}

pub fn ticket_created_message(channel_id: &ChannelId) -> MessageTemplate {
    MessageBuilder::new()
        .embed("Ticket created", format!("Your ticket: {}", channel_mention(channel_id)))
        .build()
}

pub fn duplicate_ticket_message(channel_id: &ChannelId) -> MessageTemplate {
    MessageBuilder::new()
        .embed(
            "Ticket already open",
            format!("You already have an open ticket: {}", channel_mention(channel_id)),
        )
        .build()
}

pub fn failure_message(user_message: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new()
        .embed("Ticket unavailable", format!("{user_message}\nReference: `{correlation_id}`"))
        .build()
}

pub fn closing_message(grace: Duration) -> MessageTemplate {
    MessageBuilder::new()
        .embed("Closing ticket", format!("This ticket will be deleted in {} seconds.", grace.as_secs()))
        .build()
}

pub fn close_log_message(event: &AuditEvent) -> MessageTemplate {
    let mut description = format!(
        "Ticket **{}** ({}) was closed by {}",
        event.channel_name,
        channel_mention(&event.channel_id),
        user_mention(&event.actor_id),
    );
    if let Some(requester_id) = &event.requester_id {
        description.push_str(&format!("\nOpened by: {}", user_mention(requester_id)));
    }
    description.push_str(&format!("\nClosed at: {}", event.occurred_at.to_rfc3339()));

    MessageBuilder::new().embed("Ticket log", description).build()
}
