use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::audit::AuditEvent;
use crate::config::TicketConfig;
use crate::domain::ticket::{ChannelId, RequesterId, TicketRecord};
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::deletion::{schedule_deletion, ScheduledDeletion};
use crate::lifecycle::locks::RequesterLocks;
use crate::lifecycle::registry::TicketRegistry;
use crate::messages::{self, MessageTemplate};
use crate::ports::{
    member_target, ChannelRequest, ChatGateway, GatewayError, InteractionRef, OverrideTarget,
    Permission, PermissionOverride, ReplyVisibility, TicketStore,
};

const MAX_CHANNEL_NAME_LEN: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketSettings {
    pub category_id: Option<String>,
    pub staff_role_ids: Vec<String>,
    pub log_channel_id: Option<ChannelId>,
    pub close_grace: Duration,
    pub channel_prefix: String,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self {
            category_id: None,
            staff_role_ids: Vec::new(),
            log_channel_id: None,
            close_grace: Duration::from_secs(5),
            channel_prefix: "ticket".to_owned(),
        }
    }
}

impl From<&TicketConfig> for TicketSettings {
    fn from(config: &TicketConfig) -> Self {
        Self {
            category_id: config.category_id.clone(),
            staff_role_ids: config.staff_role_ids.clone(),
            log_channel_id: config.log_channel_id.clone().map(ChannelId::new),
            close_grace: Duration::from_secs(config.close_grace_secs),
            channel_prefix: config.channel_prefix.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenTicketRequest {
    pub interaction: InteractionRef,
    pub correlation_id: String,
    pub guild_id: String,
    pub requester_id: RequesterId,
    pub requester_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseTicketRequest {
    pub interaction: InteractionRef,
    pub correlation_id: String,
    pub actor_id: RequesterId,
    pub channel_id: ChannelId,
    pub channel_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOutcome {
    pub record: TicketRecord,
    pub welcome_sent: bool,
    pub confirmation_sent: bool,
}

#[derive(Debug)]
pub struct CloseOutcome {
    pub channel_id: ChannelId,
    /// Requester whose entry was removed; `None` when the channel was not tracked.
    pub released: Option<RequesterId>,
    pub acknowledged: bool,
    pub audit_delivered: bool,
    pub deletion: ScheduledDeletion,
}

/// Drives tickets through `NoTicket -> Open -> NoTicket`. The closing phase
/// is the grace window tracked by the [`ScheduledDeletion`] in a
/// [`CloseOutcome`]; the store entry is gone by then.
///
/// Opens for one requester are serialized end to end (load, check, create,
/// save, reply) through [`RequesterLocks`]; the registry's write gate keeps
/// document updates from different requesters from clobbering each other.
pub struct TicketLifecycle {
    registry: TicketRegistry,
    gateway: Arc<dyn ChatGateway>,
    settings: TicketSettings,
    locks: RequesterLocks,
}

impl TicketLifecycle {
    pub fn new(
        store: Arc<dyn TicketStore>,
        gateway: Arc<dyn ChatGateway>,
        settings: TicketSettings,
    ) -> Self {
        Self {
            registry: TicketRegistry::new(store),
            gateway,
            settings,
            locks: RequesterLocks::new(),
        }
    }

    pub fn registry(&self) -> &TicketRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &TicketSettings {
        &self.settings
    }

    pub async fn open_ticket(
        &self,
        request: &OpenTicketRequest,
    ) -> Result<OpenOutcome, ApplicationError> {
        let _guard = self.locks.acquire(&request.requester_id).await;

        let result = self.open_locked(request).await;
        if let Err(error) = &result {
            self.reply_open_failure(request, error).await;
        }
        result
    }

    async fn open_locked(
        &self,
        request: &OpenTicketRequest,
    ) -> Result<OpenOutcome, ApplicationError> {
        let document = self.registry.load().await?;
        if let Some(existing) = document.channel_for(&request.requester_id) {
            info!(
                event_name = "ticket.open.duplicate",
                correlation_id = %request.correlation_id,
                requester_id = %request.requester_id,
                channel_id = %existing,
                "requester already has an open ticket"
            );
            return Err(DomainError::DuplicateTicket {
                requester_id: request.requester_id.clone(),
                channel_id: existing.clone(),
            }
            .into());
        }

        let channel_request = ChannelRequest {
            guild_id: request.guild_id.clone(),
            name: ticket_channel_name(
                &self.settings.channel_prefix,
                &request.requester_name,
                &request.requester_id,
            ),
            parent_category: self.settings.category_id.clone(),
            permission_overrides: ticket_permissions(
                &request.guild_id,
                &request.requester_id,
                &self.settings.staff_role_ids,
            ),
        };
        let channel = self
            .gateway
            .create_text_channel(&channel_request)
            .await
            .map_err(|error| ApplicationError::ChannelProvision(error.to_string()))?;
        info!(
            event_name = "ticket.open.channel_created",
            correlation_id = %request.correlation_id,
            requester_id = %request.requester_id,
            channel_id = %channel.id,
            channel_name = %channel.name,
            "ticket channel provisioned"
        );

        if let Err(error) =
            self.registry.insert(request.requester_id.clone(), channel.id.clone()).await
        {
            self.discard_orphan(&channel.id, &request.correlation_id).await;
            return Err(error);
        }
        info!(
            event_name = "ticket.open.persisted",
            correlation_id = %request.correlation_id,
            requester_id = %request.requester_id,
            channel_id = %channel.id,
            "ticket recorded in store"
        );

        let welcome_sent = match self
            .gateway
            .send_message(&channel.id, &messages::welcome_message(&request.requester_id))
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "ticket.open.welcome_failed",
                    correlation_id = %request.correlation_id,
                    channel_id = %channel.id,
                    error = %error,
                    "failed to post welcome message"
                );
                false
            }
        };

        let confirmation_sent = self
            .reply(
                &request.interaction,
                &messages::ticket_created_message(&channel.id),
                ReplyVisibility::Private,
                &request.correlation_id,
            )
            .await;

        Ok(OpenOutcome {
            record: TicketRecord { requester_id: request.requester_id.clone(), channel_id: channel.id },
            welcome_sent,
            confirmation_sent,
        })
    }

    /// Closing is idempotent with respect to the store: an untracked channel
    /// is still acknowledged, scheduled for deletion and logged.
    ///
    /// The store entry is removed before anything else happens. If the store
    /// itself fails the close is aborted and the channel is left in place.
    pub async fn close_ticket(
        &self,
        request: &CloseTicketRequest,
    ) -> Result<CloseOutcome, ApplicationError> {
        let released = match self.registry.release_channel(&request.channel_id).await {
            Ok(released) => released,
            Err(error) => {
                warn!(
                    event_name = "ticket.close.store_failed",
                    correlation_id = %request.correlation_id,
                    channel_id = %request.channel_id,
                    error = %error,
                    "could not release ticket; close aborted"
                );
                let interface = error.clone().into_interface(request.correlation_id.clone());
                self.reply(
                    &request.interaction,
                    &messages::failure_message(interface.user_message(), &request.correlation_id),
                    ReplyVisibility::Private,
                    &request.correlation_id,
                )
                .await;
                return Err(error);
            }
        };
        info!(
            event_name = "ticket.close.released",
            correlation_id = %request.correlation_id,
            channel_id = %request.channel_id,
            actor_id = %request.actor_id,
            requester_id = released.as_ref().map(RequesterId::as_str).unwrap_or("untracked"),
            "ticket released from store"
        );

        let acknowledged = self
            .reply(
                &request.interaction,
                &messages::closing_message(self.settings.close_grace),
                ReplyVisibility::Public,
                &request.correlation_id,
            )
            .await;

        let deletion = schedule_deletion(
            self.gateway.clone(),
            request.channel_id.clone(),
            self.settings.close_grace,
            request.correlation_id.clone(),
        );

        let event = AuditEvent::ticket_closed(
            request.correlation_id.clone(),
            request.actor_id.clone(),
            request.channel_id.clone(),
            request.channel_name.clone().unwrap_or_else(|| request.channel_id.to_string()),
            released.clone(),
        );
        let audit_delivered = match self.deliver_audit(&event).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "ticket.close.audit_failed",
                    correlation_id = %request.correlation_id,
                    channel_id = %request.channel_id,
                    error = %error,
                    "ticket close audit entry was not delivered"
                );
                false
            }
        };

        Ok(CloseOutcome {
            channel_id: request.channel_id.clone(),
            released,
            acknowledged,
            audit_delivered,
            deletion,
        })
    }

    /// Posts the panel carrying the open-ticket button into `channel_id`.
    pub async fn post_panel(&self, channel_id: &ChannelId) -> Result<(), ApplicationError> {
        self.gateway
            .send_message(channel_id, &messages::ticket_panel_message())
            .await
            .map_err(|error| ApplicationError::Gateway(error.to_string()))
    }

    async fn deliver_audit(&self, event: &AuditEvent) -> Result<(), ApplicationError> {
        let Some(log_channel_id) = &self.settings.log_channel_id else {
            return Err(ApplicationError::LogDelivery("no log channel configured".to_owned()));
        };

        let log_channel = self
            .gateway
            .fetch_channel(log_channel_id)
            .await
            .map_err(|error| ApplicationError::LogDelivery(error.to_string()))?
            .ok_or_else(|| {
                ApplicationError::LogDelivery(format!("log channel {log_channel_id} not found"))
            })?;

        self.gateway
            .send_message(&log_channel.id, &messages::close_log_message(event))
            .await
            .map_err(|error| ApplicationError::LogDelivery(error.to_string()))
    }

    async fn reply_open_failure(&self, request: &OpenTicketRequest, error: &ApplicationError) {
        let message = match error {
            ApplicationError::Domain(DomainError::DuplicateTicket { channel_id, .. }) => {
                messages::duplicate_ticket_message(channel_id)
            }
            other => {
                warn!(
                    event_name = "ticket.open.failed",
                    correlation_id = %request.correlation_id,
                    requester_id = %request.requester_id,
                    error = %other,
                    "ticket open aborted"
                );
                let interface = other.clone().into_interface(request.correlation_id.clone());
                messages::failure_message(interface.user_message(), interface.correlation_id())
            }
        };

        self.reply(
            &request.interaction,
            &message,
            ReplyVisibility::Private,
            &request.correlation_id,
        )
        .await;
    }

    async fn discard_orphan(&self, channel_id: &ChannelId, correlation_id: &str) {
        match self.gateway.delete_channel(channel_id).await {
            Ok(()) | Err(GatewayError::NotFound(_)) => {
                info!(
                    event_name = "ticket.open.orphan_discarded",
                    correlation_id = %correlation_id,
                    channel_id = %channel_id,
                    "removed channel that could not be recorded"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "ticket.open.orphan_discard_failed",
                    correlation_id = %correlation_id,
                    channel_id = %channel_id,
                    error = %error,
                    "untracked ticket channel left behind"
                );
            }
        }
    }

    async fn reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
        visibility: ReplyVisibility,
        correlation_id: &str,
    ) -> bool {
        match self.gateway.reply(interaction, message, visibility).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "ticket.reply_failed",
                    correlation_id = %correlation_id,
                    interaction_id = %interaction.id,
                    error = %error,
                    "failed to reply to interaction"
                );
                false
            }
        }
    }
}

/// `<prefix>-<slug>` where the slug is the lowercased display name with
/// anything outside `[a-z0-9_-]` turned into `-`.
pub fn ticket_channel_name(prefix: &str, display_name: &str, requester_id: &RequesterId) -> String {
    let mut slug = String::with_capacity(display_name.len());
    for ch in display_name.trim().chars().flat_map(char::to_lowercase) {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '-' };
        if mapped == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(mapped);
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { requester_id.as_str() } else { slug };

    let name = format!("{prefix}-{slug}");
    name.chars().take(MAX_CHANNEL_NAME_LEN).collect()
}

/// `@everyone` (whose role id equals the guild id) loses view access; the
/// requester and every staff role can view and write.
pub fn ticket_permissions(
    guild_id: &str,
    requester_id: &RequesterId,
    staff_role_ids: &[String],
) -> Vec<PermissionOverride> {
    let access = [Permission::ViewChannel, Permission::SendMessages];

    let mut overrides = vec![
        PermissionOverride::deny(OverrideTarget::Role(guild_id.to_owned()), &[Permission::ViewChannel]),
        PermissionOverride::allow(member_target(requester_id), &access),
    ];
    overrides.extend(
        staff_role_ids
            .iter()
            .map(|role_id| PermissionOverride::allow(OverrideTarget::Role(role_id.clone()), &access)),
    );
    overrides
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{
        ticket_channel_name, ticket_permissions, CloseTicketRequest, OpenTicketRequest,
        TicketLifecycle, TicketSettings,
    };
    use crate::domain::ticket::{ChannelId, RequesterId, TicketState};
    use crate::errors::{ApplicationError, DomainError};
    use crate::lifecycle::deletion::DeletionOutcome;
    use crate::testing::{MemoryStore, RecordingGateway};
    use crate::messages::CLOSE_TICKET_ACTION;
    use crate::ports::{InteractionRef, OverrideTarget, Permission, ReplyVisibility};

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<RecordingGateway>,
        lifecycle: Arc<TicketLifecycle>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let gateway = Arc::new(RecordingGateway::default());
        gateway.add_channel("log-1", "ticket-log");
        let lifecycle = Arc::new(TicketLifecycle::new(
            store.clone(),
            gateway.clone(),
            TicketSettings {
                category_id: Some("cat-1".to_owned()),
                staff_role_ids: vec!["staff-role".to_owned()],
                log_channel_id: Some(ChannelId::new("log-1")),
                ..TicketSettings::default()
            },
        ));
        Harness { store, gateway, lifecycle }
    }

    fn open_request(requester: &str, name: &str) -> OpenTicketRequest {
        OpenTicketRequest {
            interaction: InteractionRef {
                id: format!("int-open-{requester}"),
                token: "token".to_owned(),
            },
            correlation_id: format!("req-open-{requester}"),
            guild_id: "guild-1".to_owned(),
            requester_id: RequesterId::new(requester),
            requester_name: name.to_owned(),
        }
    }

    fn close_request(actor: &str, channel: &str) -> CloseTicketRequest {
        CloseTicketRequest {
            interaction: InteractionRef { id: format!("int-close-{actor}"), token: "token".to_owned() },
            correlation_id: format!("req-close-{actor}"),
            actor_id: RequesterId::new(actor),
            channel_id: ChannelId::new(channel),
            channel_name: Some("ticket-alice".to_owned()),
        }
    }

    #[tokio::test]
    async fn open_creates_channel_persists_then_welcomes_and_confirms() {
        let h = harness();

        let outcome =
            h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");

        assert_eq!(outcome.record.channel_id, ChannelId::new("chan-1"));
        assert!(outcome.welcome_sent);
        assert!(outcome.confirmation_sent);
        assert_eq!(h.store.snapshot_json(), serde_json::json!({"tickets": {"alice-id": "chan-1"}}));

        let created = h.gateway.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "ticket-alice");
        assert_eq!(created[0].parent_category.as_deref(), Some("cat-1"));
        assert_eq!(created[0].guild_id, "guild-1");

        let messages = h.gateway.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, ChannelId::new("chan-1"));
        assert_eq!(messages[0].1.content.as_deref(), Some("<@alice-id>"));
        assert!(messages[0].1.has_button(CLOSE_TICKET_ACTION));

        let replies = h.gateway.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].visibility, ReplyVisibility::Private);
        assert!(replies[0].message.fallback_text().contains("<#chan-1>"));
    }

    #[tokio::test]
    async fn second_open_is_rejected_without_side_effects() {
        let h = harness();
        h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");
        let saves_before = h.store.saves();

        let error = h
            .lifecycle
            .open_ticket(&open_request("alice-id", "Alice"))
            .await
            .expect_err("duplicate open");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::DuplicateTicket {
                requester_id: RequesterId::new("alice-id"),
                channel_id: ChannelId::new("chan-1"),
            })
        );
        assert_eq!(h.gateway.created().len(), 1);
        assert_eq!(h.store.saves(), saves_before);

        let replies = h.gateway.replies();
        let rejection = replies.last().expect("rejection reply");
        assert_eq!(rejection.visibility, ReplyVisibility::Private);
        assert!(rejection.message.fallback_text().contains("<#chan-1>"));
    }

    #[tokio::test]
    async fn concurrent_opens_for_same_requester_create_one_channel() {
        let h = harness();
        h.gateway.slow_creates(Duration::from_millis(30));

        let first_request = open_request("alice-id", "Alice");
        let second_request = open_request("alice-id", "Alice");
        let (first, second) = tokio::join!(
            h.lifecycle.open_ticket(&first_request),
            h.lifecycle.open_ticket(&second_request),
        );

        let results = [first, second];
        let opened = results.iter().filter(|result| result.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|result| matches!(result, Err(error) if error.is_rejection()))
            .count();
        assert_eq!(opened, 1);
        assert_eq!(rejected, 1);
        assert_eq!(h.gateway.created().len(), 1);
        assert_eq!(h.store.snapshot_json(), serde_json::json!({"tickets": {"alice-id": "chan-1"}}));
    }

    #[tokio::test]
    async fn concurrent_opens_for_different_requesters_both_succeed() {
        let h = harness();
        h.gateway.slow_creates(Duration::from_millis(10));

        let alice = open_request("alice-id", "Alice");
        let bob = open_request("bob-id", "Bob");
        let (alice, bob) =
            tokio::join!(h.lifecycle.open_ticket(&alice), h.lifecycle.open_ticket(&bob));

        alice.expect("alice opens");
        bob.expect("bob opens");
        assert_eq!(h.gateway.created().len(), 2);

        let document = h.lifecycle.registry().load().await.expect("load");
        assert!(document.has(&RequesterId::new("alice-id")));
        assert!(document.has(&RequesterId::new("bob-id")));
    }

    #[tokio::test]
    async fn provisioning_failure_leaves_store_untouched() {
        let h = harness();
        h.gateway.fail_creates();

        let error = h
            .lifecycle
            .open_ticket(&open_request("alice-id", "Alice"))
            .await
            .expect_err("provisioning fails");

        assert!(matches!(error, ApplicationError::ChannelProvision(_)));
        assert_eq!(h.store.saves(), 0);
        assert!(!h.lifecycle.registry().has(&RequesterId::new("alice-id")).await.expect("has"));

        let replies = h.gateway.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].visibility, ReplyVisibility::Private);
        assert!(replies[0].message.fallback_text().contains("req-open-alice-id"));
    }

    #[tokio::test]
    async fn store_write_failure_discards_new_channel() {
        let h = harness();
        h.store.fail_saves();

        let error = h
            .lifecycle
            .open_ticket(&open_request("alice-id", "Alice"))
            .await
            .expect_err("store write fails");

        assert!(matches!(error, ApplicationError::Storage(_)));
        assert_eq!(h.gateway.deleted(), vec![ChannelId::new("chan-1")]);
        assert!(h.gateway.messages().is_empty(), "no welcome for an unrecorded ticket");
    }

    #[tokio::test]
    async fn corrupt_store_blocks_open() {
        let h = harness();
        h.store.corrupt("expected map");

        let error = h
            .lifecycle
            .open_ticket(&open_request("alice-id", "Alice"))
            .await
            .expect_err("corrupt store");

        assert!(matches!(error, ApplicationError::CorruptState(_)));
        assert!(h.gateway.created().is_empty());
    }

    #[tokio::test]
    async fn welcome_failure_does_not_undo_open() {
        let h = harness();
        h.gateway.fail_sends();

        let outcome =
            h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");

        assert!(!outcome.welcome_sent);
        assert!(outcome.confirmation_sent);
        assert!(h.lifecycle.registry().has(&RequesterId::new("alice-id")).await.expect("has"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_clears_store_acknowledges_and_schedules_deletion() {
        let h = harness();
        h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");
        let start = Instant::now();

        let outcome = h
            .lifecycle
            .close_ticket(&close_request("staff-1", "chan-1"))
            .await
            .expect("close");

        assert_eq!(outcome.released, Some(RequesterId::new("alice-id")));
        assert!(outcome.acknowledged);
        assert!(outcome.audit_delivered);
        assert_eq!(h.store.snapshot_json(), serde_json::json!({"tickets": {}}));
        assert!(h.gateway.deleted().is_empty(), "deletion waits for the grace delay");
        assert_eq!(outcome.deletion.deadline - start, Duration::from_secs(5));
        let during_grace = h.lifecycle.registry().load().await.expect("load");
        assert_eq!(during_grace.state_of(&RequesterId::new("alice-id")), TicketState::NoTicket);

        let ack = h.gateway.replies().last().cloned().expect("ack");
        assert_eq!(ack.visibility, ReplyVisibility::Public);
        assert!(ack.message.fallback_text().contains("5 seconds"));

        let log = h
            .gateway
            .messages()
            .into_iter()
            .find(|(channel, _)| channel == &ChannelId::new("log-1"))
            .expect("audit entry");
        assert!(log.1.fallback_text().contains("<@staff-1>"));

        assert_eq!(outcome.deletion.join().await, DeletionOutcome::Deleted);
        assert_eq!(h.gateway.deleted(), vec![ChannelId::new("chan-1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_twice_is_idempotent() {
        let h = harness();
        h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");

        let first = h
            .lifecycle
            .close_ticket(&close_request("alice-id", "chan-1"))
            .await
            .expect("first close");
        let second = h
            .lifecycle
            .close_ticket(&close_request("staff-1", "chan-1"))
            .await
            .expect("second close");

        assert_eq!(first.released, Some(RequesterId::new("alice-id")));
        assert_eq!(second.released, None);
        assert!(second.acknowledged);
        assert_eq!(h.store.snapshot_json(), serde_json::json!({"tickets": {}}));

        let outcomes = [first.deletion.join().await, second.deletion.join().await];
        assert!(outcomes.contains(&DeletionOutcome::Deleted));
        assert!(outcomes.contains(&DeletionOutcome::AlreadyGone));
        assert_eq!(h.gateway.deleted(), vec![ChannelId::new("chan-1")]);
        assert_eq!(h.store.snapshot_json(), serde_json::json!({"tickets": {}}));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_untracked_channel_still_acknowledges_and_logs() {
        let h = harness();
        h.gateway.add_channel("chan-x", "general");

        let outcome = h
            .lifecycle
            .close_ticket(&close_request("staff-1", "chan-x"))
            .await
            .expect("close");

        assert_eq!(outcome.released, None);
        assert!(outcome.acknowledged);
        assert!(outcome.audit_delivered);
        assert_eq!(outcome.deletion.join().await, DeletionOutcome::Deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_log_channel_does_not_abort_close() {
        let store = Arc::new(MemoryStore::default());
        let gateway = Arc::new(RecordingGateway::default());
        let lifecycle = TicketLifecycle::new(
            store.clone(),
            gateway.clone(),
            TicketSettings {
                log_channel_id: Some(ChannelId::new("log-missing")),
                ..TicketSettings::default()
            },
        );
        lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");

        let outcome =
            lifecycle.close_ticket(&close_request("staff-1", "chan-1")).await.expect("close");

        assert!(!outcome.audit_delivered);
        assert!(outcome.acknowledged);
        assert_eq!(store.snapshot_json(), serde_json::json!({"tickets": {}}));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_deletion_keeps_ticket_closed() {
        let h = harness();
        h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");
        h.gateway.fail_deletes();

        let outcome = h
            .lifecycle
            .close_ticket(&close_request("staff-1", "chan-1"))
            .await
            .expect("close");

        assert!(matches!(outcome.deletion.join().await, DeletionOutcome::Failed(_)));
        assert!(!h.lifecycle.registry().has(&RequesterId::new("alice-id")).await.expect("has"));
        assert_eq!(
            h.lifecycle.registry().find_by_channel(&ChannelId::new("chan-1")).await.expect("find"),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_during_close_schedules_nothing() {
        let h = harness();
        h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");
        h.store.fail_loads();

        let error = h
            .lifecycle
            .close_ticket(&close_request("staff-1", "chan-1"))
            .await
            .expect_err("close aborted");

        assert!(matches!(error, ApplicationError::Storage(_)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.gateway.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_after_close_gets_a_new_channel() {
        let h = harness();
        h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("open");
        let closed = h
            .lifecycle
            .close_ticket(&close_request("alice-id", "chan-1"))
            .await
            .expect("close");

        let reopened =
            h.lifecycle.open_ticket(&open_request("alice-id", "Alice")).await.expect("reopen");

        assert_eq!(reopened.record.channel_id, ChannelId::new("chan-2"));
        assert_eq!(closed.deletion.join().await, DeletionOutcome::Deleted);
        assert_eq!(h.store.snapshot_json(), serde_json::json!({"tickets": {"alice-id": "chan-2"}}));
    }

    #[tokio::test]
    async fn post_panel_sends_open_button() {
        let h = harness();
        h.gateway.add_channel("support", "support");

        h.lifecycle.post_panel(&ChannelId::new("support")).await.expect("panel");

        let messages = h.gateway.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.has_button(crate::messages::OPEN_TICKET_ACTION));
    }

    #[test]
    fn channel_name_embeds_sanitized_display_name() {
        let requester = RequesterId::new("1234");
        assert_eq!(ticket_channel_name("ticket", "Alice", &requester), "ticket-alice");
        assert_eq!(ticket_channel_name("ticket", "Bob  The Builder!", &requester), "ticket-bob-the-builder");
        assert_eq!(ticket_channel_name("ticket", "🎫🎫", &requester), "ticket-1234");

        let long = "x".repeat(300);
        assert_eq!(ticket_channel_name("ticket", &long, &requester).len(), 100);
    }

    #[test]
    fn permissions_hide_channel_from_everyone_but_requester_and_staff() {
        let overrides = ticket_permissions(
            "guild-1",
            &RequesterId::new("alice-id"),
            &["staff-a".to_owned(), "staff-b".to_owned()],
        );

        assert_eq!(overrides.len(), 4);
        assert_eq!(overrides[0].target, OverrideTarget::Role("guild-1".to_owned()));
        assert_eq!(overrides[0].deny, vec![Permission::ViewChannel]);
        assert_eq!(overrides[1].target, OverrideTarget::Member("alice-id".to_owned()));
        assert_eq!(overrides[1].allow, vec![Permission::ViewChannel, Permission::SendMessages]);
        assert!(overrides[2..]
            .iter()
            .all(|entry| matches!(entry.target, OverrideTarget::Role(_)) && entry.deny.is_empty()));
    }
}
