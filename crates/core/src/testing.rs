//! In-process fakes for the store and gateway ports, shared by the test
//! suites of every workspace crate through the `testing` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ticket::{ChannelId, TicketDocument};
use crate::messages::MessageTemplate;
use crate::ports::{
    ChannelRef, ChannelRequest, ChatGateway, GatewayError, InteractionRef, ReplyVisibility,
    StoreError, TicketStore,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Option<TicketDocument>>,
    corrupt: Mutex<Option<String>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn corrupt(&self, detail: &str) {
        *lock(&self.corrupt) = Some(detail.to_owned());
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot_json(&self) -> serde_json::Value {
        let document = lock(&self.document).clone().unwrap_or_default();
        serde_json::to_value(document).unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn load(&self) -> Result<TicketDocument, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("disk unavailable".to_owned()));
        }
        if let Some(detail) = lock(&self.corrupt).clone() {
            return Err(StoreError::CorruptState(detail));
        }
        // Yield so concurrent callers interleave like they would on real I/O.
        tokio::task::yield_now().await;
        let mut document = lock(&self.document);
        Ok(document.get_or_insert_with(TicketDocument::new).clone())
    }

    async fn save(&self, document: &TicketDocument) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("disk full".to_owned()));
        }
        tokio::task::yield_now().await;
        *lock(&self.document) = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RecordedReply {
    pub interaction: InteractionRef,
    pub message: MessageTemplate,
    pub visibility: ReplyVisibility,
}

#[derive(Default)]
struct GatewayState {
    next_channel: u32,
    live: HashMap<ChannelId, ChannelRef>,
    created: Vec<ChannelRequest>,
    deleted: Vec<ChannelId>,
    messages: Vec<(ChannelId, MessageTemplate)>,
    replies: Vec<RecordedReply>,
}

#[derive(Default)]
pub struct RecordingGateway {
    state: Mutex<GatewayState>,
    create_delay: Mutex<Option<Duration>>,
    fail_creates: AtomicBool,
    fail_deletes: AtomicBool,
    fail_sends: AtomicBool,
}

impl RecordingGateway {
    pub fn add_channel(&self, id: &str, name: &str) {
        let channel = ChannelRef { id: ChannelId::new(id), name: name.to_owned() };
        lock(&self.state).live.insert(channel.id.clone(), channel);
    }

    pub fn slow_creates(&self, delay: Duration) {
        *lock(&self.create_delay) = Some(delay);
    }

    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<ChannelRequest> {
        lock(&self.state).created.clone()
    }

    pub fn deleted(&self) -> Vec<ChannelId> {
        lock(&self.state).deleted.clone()
    }

    pub fn messages(&self) -> Vec<(ChannelId, MessageTemplate)> {
        lock(&self.state).messages.clone()
    }

    pub fn replies(&self) -> Vec<RecordedReply> {
        lock(&self.state).replies.clone()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn create_text_channel(
        &self,
        request: &ChannelRequest,
    ) -> Result<ChannelRef, GatewayError> {
        let delay = *lock(&self.create_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("missing access".to_owned()));
        }

        let mut state = lock(&self.state);
        state.next_channel += 1;
        let channel = ChannelRef {
            id: ChannelId::new(format!("chan-{}", state.next_channel)),
            name: request.name.clone(),
        };
        state.live.insert(channel.id.clone(), channel.clone());
        state.created.push(request.clone());
        Ok(channel)
    }

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), GatewayError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("rate limited".to_owned()));
        }
        let mut state = lock(&self.state);
        if state.live.remove(channel_id).is_none() {
            return Err(GatewayError::NotFound(channel_id.to_string()));
        }
        state.deleted.push(channel_id.clone());
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<(), GatewayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("send rejected".to_owned()));
        }
        let mut state = lock(&self.state);
        if !state.live.contains_key(channel_id) {
            return Err(GatewayError::NotFound(channel_id.to_string()));
        }
        state.messages.push((channel_id.clone(), message.clone()));
        Ok(())
    }

    async fn fetch_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRef>, GatewayError> {
        Ok(lock(&self.state).live.get(channel_id).cloned())
    }

    async fn reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
        visibility: ReplyVisibility,
    ) -> Result<(), GatewayError> {
        lock(&self.state).replies.push(RecordedReply {
            interaction: interaction.clone(),
            message: message.clone(),
            visibility,
        });
        Ok(())
    }
}
