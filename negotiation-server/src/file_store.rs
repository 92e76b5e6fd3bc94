//! File-backed negotiation store.
//!
//! The whole table is rewritten after every mutation (temp file, fsync,
//! rename), so negotiations survive a restart. A mutation is applied to a copy of the
//! table and only becomes visible once the file write succeeded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use negotiation_core::{IdentifierService, NegotiationRecord, NegotiationState, UrnUuidMinter};

use crate::store::{NegotiationStore, RecordTable, StoreError, TableSnapshot};

/// JSON file store.
pub struct FileStore {
    path: PathBuf,
    table: Mutex<RecordTable>,
    minter: Box<dyn IdentifierService>,
}

impl FileStore {
    /// Load `path` if it exists; a missing or empty file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_minter(path, Box::new(UrnUuidMinter)).await
    }

    pub async fn open_with_minter(
        path: impl Into<PathBuf>,
        minter: Box<dyn IdentifierService>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => TableSnapshot::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TableSnapshot::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            table: Mutex::new(RecordTable::from_snapshot(snapshot)?),
            minter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, table: &RecordTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(&table.to_snapshot())?;
        let tmp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl NegotiationStore for FileStore {
    async fn find_by_provider_pid(
        &self,
        provider_pid: &str,
    ) -> Result<Option<NegotiationRecord>, StoreError> {
        Ok(self.table.lock().await.get(provider_pid).cloned())
    }

    async fn find_by_consumer_pid(
        &self,
        consumer_pid: &str,
    ) -> Result<Option<NegotiationRecord>, StoreError> {
        Ok(self
            .table
            .lock()
            .await
            .latest_for_consumer(consumer_pid)
            .cloned())
    }

    async fn create(
        &self,
        consumer_pid: &str,
        initial_state: NegotiationState,
    ) -> Result<NegotiationRecord, StoreError> {
        let record =
            NegotiationRecord::with_state(self.minter.mint(), consumer_pid, initial_state);

        let mut table = self.table.lock().await;
        let mut next = table.clone();
        next.insert_new(record.clone())?;
        self.persist(&next).await?;
        *table = next;
        Ok(record)
    }

    async fn save(&self, record: NegotiationRecord) -> Result<NegotiationRecord, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let saved = next.update(record)?;
        self.persist(&next).await?;
        *table = next;
        Ok(saved)
    }
}
