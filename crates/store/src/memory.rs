use async_trait::async_trait;
use tokio::sync::RwLock;

use ticketdesk_core::domain::ticket::TicketDocument;
use ticketdesk_core::ports::{StoreError, TicketStore};

/// Process-local store. `load` on a fresh instance initializes an empty
/// document, mirroring the file-backed store.
#[derive(Default)]
pub struct InMemoryTicketStore {
    document: RwLock<Option<TicketDocument>>,
}

impl InMemoryTicketStore {
    pub fn with_document(document: TicketDocument) -> Self {
        Self { document: RwLock::new(Some(document)) }
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn load(&self) -> Result<TicketDocument, StoreError> {
        if let Some(document) = self.document.read().await.as_ref() {
            return Ok(document.clone());
        }

        let mut document = self.document.write().await;
        Ok(document.get_or_insert_with(TicketDocument::new).clone())
    }

    async fn save(&self, document: &TicketDocument) -> Result<(), StoreError> {
        *self.document.write().await = Some(document.clone());
        Ok(())
    }
}
