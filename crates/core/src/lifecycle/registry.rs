use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::ticket::{ChannelId, RequesterId, TicketDocument};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::TicketStore;

/// Query and mutation surface over a [`TicketStore`].
///
/// Every mutation is a load-modify-save of the whole document. Reads and
/// mutations alike go through a single gate: a store load may itself write
/// (a missing file is initialized on first load), so an ungated read could
/// race a concurrent save. The gate is held only for the store round trip,
/// never across gateway calls.
pub struct TicketRegistry {
    store: Arc<dyn TicketStore>,
    write_gate: Mutex<()>,
}

impl TicketRegistry {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store, write_gate: Mutex::new(()) }
    }

    pub async fn load(&self) -> Result<TicketDocument, ApplicationError> {
        let _gate = self.write_gate.lock().await;
        Ok(self.store.load().await?)
    }

    pub async fn save(&self, document: &TicketDocument) -> Result<(), ApplicationError> {
        let _gate = self.write_gate.lock().await;
        Ok(self.store.save(document).await?)
    }

    pub async fn has(&self, requester_id: &RequesterId) -> Result<bool, ApplicationError> {
        Ok(self.load().await?.has(requester_id))
    }

    pub async fn channel_for(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Option<ChannelId>, ApplicationError> {
        Ok(self.load().await?.channel_for(requester_id).cloned())
    }

    pub async fn find_by_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<RequesterId>, ApplicationError> {
        Ok(self.load().await?.find_by_channel(channel_id).cloned())
    }

    pub async fn insert(
        &self,
        requester_id: RequesterId,
        channel_id: ChannelId,
    ) -> Result<(), ApplicationError> {
        let _gate = self.write_gate.lock().await;
        let mut document = self.store.load().await?;
        document.insert(requester_id.clone(), channel_id).map_err(|existing| {
            DomainError::DuplicateTicket { requester_id, channel_id: existing }
        })?;
        Ok(self.store.save(&document).await?)
    }

    pub async fn remove(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Option<ChannelId>, ApplicationError> {
        let _gate = self.write_gate.lock().await;
        let mut document = self.store.load().await?;
        let removed = document.remove(requester_id);
        if removed.is_some() {
            self.store.save(&document).await?;
        }
        Ok(removed)
    }

    /// Reverse lookup plus removal in one gated step. Returns the requester
    /// whose entry pointed at `channel_id`, or `None` when the channel was not
    /// tracked (already closed, or never a ticket).
    pub async fn release_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<RequesterId>, ApplicationError> {
        let _gate = self.write_gate.lock().await;
        let mut document = self.store.load().await?;
        let Some(requester_id) = document.find_by_channel(channel_id).cloned() else {
            return Ok(None);
        };
        document.remove(&requester_id);
        self.store.save(&document).await?;
        Ok(Some(requester_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::TicketRegistry;
    use crate::domain::ticket::{ChannelId, RequesterId, TicketDocument};
    use crate::errors::{ApplicationError, DomainError};
    use crate::ports::{StoreError, TicketStore};
    use crate::testing::MemoryStore;

    /// Writes an empty document on the first load that finds nothing, after
    /// a yield, the way a file-backed store initializes a missing file.
    #[derive(Default)]
    struct InitializingStore {
        document: Mutex<Option<TicketDocument>>,
    }

    impl InitializingStore {
        fn current(&self) -> Option<TicketDocument> {
            self.document.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
        }

        fn replace(&self, document: TicketDocument) {
            *self.document.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
                Some(document);
        }
    }

    #[async_trait]
    impl TicketStore for InitializingStore {
        async fn load(&self) -> Result<TicketDocument, StoreError> {
            if let Some(document) = self.current() {
                return Ok(document);
            }
            tokio::task::yield_now().await;
            let empty = TicketDocument::new();
            self.replace(empty.clone());
            Ok(empty)
        }

        async fn save(&self, document: &TicketDocument) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.replace(document.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn insert_then_lookup_both_directions() {
        let store = Arc::new(MemoryStore::default());
        let registry = TicketRegistry::new(store.clone());

        registry
            .insert(RequesterId::new("alice-id"), ChannelId::new("chan-1"))
            .await
            .expect("insert");

        assert!(registry.has(&RequesterId::new("alice-id")).await.expect("has"));
        assert_eq!(
            registry.find_by_channel(&ChannelId::new("chan-1")).await.expect("find"),
            Some(RequesterId::new("alice-id"))
        );
        assert_eq!(store.snapshot_json(), serde_json::json!({"tickets": {"alice-id": "chan-1"}}));
    }

    #[tokio::test]
    async fn insert_for_tracked_requester_is_a_duplicate() {
        let registry = TicketRegistry::new(Arc::new(MemoryStore::default()));
        registry
            .insert(RequesterId::new("alice-id"), ChannelId::new("chan-1"))
            .await
            .expect("insert");

        let error = registry
            .insert(RequesterId::new("alice-id"), ChannelId::new("chan-2"))
            .await
            .expect_err("duplicate insert");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::DuplicateTicket {
                requester_id: RequesterId::new("alice-id"),
                channel_id: ChannelId::new("chan-1"),
            })
        );
    }

    #[tokio::test]
    async fn release_channel_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let registry = TicketRegistry::new(store.clone());
        registry
            .insert(RequesterId::new("alice-id"), ChannelId::new("chan-1"))
            .await
            .expect("insert");

        let first = registry.release_channel(&ChannelId::new("chan-1")).await.expect("release");
        let second = registry.release_channel(&ChannelId::new("chan-1")).await.expect("release");

        assert_eq!(first, Some(RequesterId::new("alice-id")));
        assert_eq!(second, None);
        assert_eq!(store.snapshot_json(), serde_json::json!({"tickets": {}}));
    }

    #[tokio::test]
    async fn remove_reports_cleared_channel() {
        let registry = TicketRegistry::new(Arc::new(MemoryStore::default()));
        registry
            .insert(RequesterId::new("alice-id"), ChannelId::new("chan-1"))
            .await
            .expect("insert");

        let removed = registry.remove(&RequesterId::new("alice-id")).await.expect("remove");
        assert_eq!(removed, Some(ChannelId::new("chan-1")));
        assert_eq!(registry.remove(&RequesterId::new("alice-id")).await.expect("remove"), None);
    }

    #[tokio::test]
    async fn corrupt_store_is_not_treated_as_empty() {
        let store = Arc::new(MemoryStore::default());
        store.corrupt("expected `tickets` object");
        let registry = TicketRegistry::new(store);

        let error = registry.has(&RequesterId::new("alice-id")).await.expect_err("corrupt");
        assert!(matches!(error, ApplicationError::CorruptState(_)));
    }

    #[tokio::test]
    async fn concurrent_inserts_for_different_requesters_both_persist() {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(TicketRegistry::new(store.clone()));

        let (alice, bob) = tokio::join!(
            registry.insert(RequesterId::new("alice-id"), ChannelId::new("chan-1")),
            registry.insert(RequesterId::new("bob-id"), ChannelId::new("chan-2")),
        );
        alice.expect("alice insert");
        bob.expect("bob insert");

        assert_eq!(
            store.snapshot_json(),
            serde_json::json!({"tickets": {"alice-id": "chan-1", "bob-id": "chan-2"}})
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_racing_inserts_on_an_uninitialized_store_keep_every_entry() {
        let store = Arc::new(InitializingStore::default());
        let registry = Arc::new(TicketRegistry::new(store.clone()));

        let mut tasks = Vec::new();
        for index in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let requester = RequesterId::new(format!("user-{index}"));
                registry.has(&requester).await.expect("has");
                registry
                    .insert(requester, ChannelId::new(format!("chan-{index}")))
                    .await
                    .expect("insert");
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }

        let document = store.current().expect("initialized");
        assert_eq!(document.len(), 8);
        for index in 0..8 {
            assert_eq!(
                document.channel_for(&RequesterId::new(format!("user-{index}"))),
                Some(&ChannelId::new(format!("chan-{index}")))
            );
        }
    }
}
