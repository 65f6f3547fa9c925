use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use ticketdesk_core::domain::ticket::TicketDocument;
use ticketdesk_core::ports::{StoreError, TicketStore};

/// Whole-document JSON store. Every write to the file, including the
/// initializing write of a missing store, happens under `write_lock`.
pub struct JsonFileTicketStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileTicketStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_document(&self, document: &TicketDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                StoreError::Storage(format!(
                    "failed to prepare ticket store directory `{}`: {error}",
                    parent.display()
                ))
            })?;
        }

        let payload = encode(document)?;
        let temp_path = self.temp_path();

        tokio::fs::write(&temp_path, payload).await.map_err(|error| {
            StoreError::Storage(format!(
                "failed to write ticket store payload `{}`: {error}",
                temp_path.display()
            ))
        })?;

        if let Err(error) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StoreError::Storage(format!(
                "failed to finalize ticket store `{}`: {error}",
                self.path.display()
            )));
        }

        Ok(())
    }

    /// Sibling of the store file, e.g. `tickets.json.<uuid>.tmp`.
    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tickets".to_owned());
        self.path.with_file_name(format!("{file_name}.{}.tmp", Uuid::new_v4().simple()))
    }

    async fn read_raw(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::Storage(format!(
                "failed to read ticket store `{}`: {error}",
                self.path.display()
            ))),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<TicketDocument, StoreError> {
        serde_json::from_slice::<TicketDocument>(raw).map_err(|error| {
            StoreError::CorruptState(format!(
                "ticket store `{}` does not match the expected shape: {error}",
                self.path.display()
            ))
        })
    }

    /// Reads the document without creating the file. `None` when absent.
    pub async fn peek(&self) -> Result<Option<TicketDocument>, StoreError> {
        match self.read_raw().await? {
            Some(raw) => self.decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn initialize(&self) -> Result<TicketDocument, StoreError> {
        let _write = self.write_lock.lock().await;
        // Another caller may have initialized or saved while we waited.
        if let Some(raw) = self.read_raw().await? {
            return self.decode(&raw);
        }

        let document = TicketDocument::new();
        self.write_document(&document).await?;
        info!(
            event_name = "system.store.initialized",
            path = %self.path.display(),
            "initialized empty ticket store"
        );
        Ok(document)
    }
}

#[async_trait]
impl TicketStore for JsonFileTicketStore {
    async fn load(&self) -> Result<TicketDocument, StoreError> {
        match self.read_raw().await? {
            Some(raw) => self.decode(&raw),
            None => self.initialize().await,
        }
    }

    async fn save(&self, document: &TicketDocument) -> Result<(), StoreError> {
        let _write = self.write_lock.lock().await;
        self.write_document(document).await
    }
}

fn encode(document: &TicketDocument) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(document)
        .map_err(|error| StoreError::Storage(format!("failed to encode ticket store: {error}")))
}
