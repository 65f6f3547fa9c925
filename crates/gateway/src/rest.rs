//! HTTP implementation of [`ChatGateway`] against the Discord REST API (v10).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use ticketdesk_core::{
    config::GatewayConfig,
    domain::ticket::ChannelId,
    messages::{ButtonStyle, MessageTemplate},
    ports::{
        ChannelRef, ChannelRequest, ChatGateway, GatewayError, InteractionRef, OverrideTarget,
        Permission, PermissionOverride, ReplyVisibility,
    },
};

const GUILD_TEXT_CHANNEL: u8 = 0;
const OVERWRITE_ROLE: u8 = 0;
const OVERWRITE_MEMBER: u8 = 1;
const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
const EPHEMERAL_FLAG: u64 = 1 << 6;

const VIEW_CHANNEL_BIT: u64 = 1 << 10;
const SEND_MESSAGES_BIT: u64 = 1 << 11;

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct RestChatGateway {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

impl std::fmt::Debug for RestChatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestChatGateway")
            .field("base_url", &self.base_url)
            .field("bot_token", &"[redacted]")
            .finish()
    }
}

impl RestChatGateway {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| GatewayError::Request(format!("failed to build http client: {error}")))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned(), bot_token })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.api_base_url.clone(),
            config.bot_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, endpoint(&self.base_url, path))
            .header("Authorization", format!("Bot {}", self.bot_token.expose_secret()))
    }

    async fn send(&self, builder: RequestBuilder, resource: &str) -> Result<Response, GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|error| GatewayError::Request(format!("{resource}: {error}")))?;

        let status = response.status();
        debug!(resource, status = %status, "gateway rest call completed");
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(resource.to_owned()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Request(format!("{resource}: {status} {body}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatGateway for RestChatGateway {
    async fn create_text_channel(
        &self,
        request: &ChannelRequest,
    ) -> Result<ChannelRef, GatewayError> {
        let path = format!("guilds/{}/channels", request.guild_id);
        let response = self
            .send(self.request(Method::POST, &path).json(&channel_payload(request)), &path)
            .await?;
        let created: ChannelPayload = response
            .json()
            .await
            .map_err(|error| GatewayError::Request(format!("invalid channel payload: {error}")))?;

        Ok(ChannelRef {
            id: ChannelId::new(created.id),
            name: created.name.unwrap_or_else(|| request.name.clone()),
        })
    }

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), GatewayError> {
        let path = format!("channels/{channel_id}");
        self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<(), GatewayError> {
        let path = format!("channels/{channel_id}/messages");
        self.send(self.request(Method::POST, &path).json(&message_payload(message)), &path)
            .await?;
        Ok(())
    }

    async fn fetch_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRef>, GatewayError> {
        let path = format!("channels/{channel_id}");
        let response = match self.send(self.request(Method::GET, &path), &path).await {
            Ok(response) => response,
            Err(GatewayError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        };
        let channel: ChannelPayload = response
            .json()
            .await
            .map_err(|error| GatewayError::Request(format!("invalid channel payload: {error}")))?;

        Ok(Some(ChannelRef {
            name: channel.name.unwrap_or_else(|| channel.id.clone()),
            id: ChannelId::new(channel.id),
        }))
    }

    async fn reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
        visibility: ReplyVisibility,
    ) -> Result<(), GatewayError> {
        let path = format!("interactions/{}/{}/callback", interaction.id, interaction.token);
        let resource = format!("interactions/{}/callback", interaction.id);
        self.send(
            self.request(Method::POST, &path).json(&interaction_payload(message, visibility)),
            &resource,
        )
        .await?;
        Ok(())
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn permission_bits(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(|permission| match permission {
            Permission::ViewChannel => VIEW_CHANNEL_BIT,
            Permission::SendMessages => SEND_MESSAGES_BIT,
        })
        .fold(0_u64, |bits, bit| bits | bit)
        .to_string()
}

fn overwrite_payload(permission: &PermissionOverride) -> Value {
    let (id, kind) = match &permission.target {
        OverrideTarget::Role(id) => (id, OVERWRITE_ROLE),
        OverrideTarget::Member(id) => (id, OVERWRITE_MEMBER),
    };
    json!({
        "id": id,
        "type": kind,
        "allow": permission_bits(&permission.allow),
        "deny": permission_bits(&permission.deny),
    })
}

fn channel_payload(request: &ChannelRequest) -> Value {
    let mut payload = json!({
        "name": request.name,
        "type": GUILD_TEXT_CHANNEL,
        "permission_overwrites": request
            .permission_overrides
            .iter()
            .map(overwrite_payload)
            .collect::<Vec<_>>(),
    });
    if let Some(parent) = &request.parent_category {
        payload["parent_id"] = json!(parent);
    }
    payload
}

fn button_style(style: &ButtonStyle) -> u8 {
    match style {
        ButtonStyle::Primary => 1,
        ButtonStyle::Secondary => 2,
        ButtonStyle::Danger => 4,
    }
}

fn message_payload(message: &MessageTemplate) -> Value {
    let mut payload = json!({
        "embeds": message
            .embeds
            .iter()
            .map(|embed| json!({ "title": embed.title, "description": embed.description }))
            .collect::<Vec<_>>(),
    });
    if let Some(content) = &message.content {
        payload["content"] = json!(content);
    }
    if !message.buttons.is_empty() {
        let buttons = message
            .buttons
            .iter()
            .map(|button| {
                json!({
                    "type": BUTTON,
                    "style": button_style(&button.style),
                    "label": button.label,
                    "custom_id": button.custom_id,
                })
            })
            .collect::<Vec<_>>();
        payload["components"] = json!([{ "type": ACTION_ROW, "components": buttons }]);
    }
    payload
}

fn interaction_payload(message: &MessageTemplate, visibility: ReplyVisibility) -> Value {
    let mut data = message_payload(message);
    if visibility == ReplyVisibility::Private {
        data["flags"] = json!(EPHEMERAL_FLAG);
    }
    json!({ "type": CHANNEL_MESSAGE_WITH_SOURCE, "data": data })
}
