//! Negotiation record storage.
//!
//! The store is the only shared mutable resource of the service. Records are
//! keyed by `providerPid`, with a secondary `consumerPid` index. Every save
//! is checked against the record's `version`; a mismatch means another
//! request committed first and the caller must retry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use negotiation_core::{
    IdentifierService, NegotiationError, NegotiationRecord, NegotiationState, UrnUuidMinter,
};

use crate::config::StoreConfig;
use crate::file_store::FileStore;

/// Errors returned by a [`NegotiationStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict.
    #[error("concurrent conflict on negotiation {provider_pid}: expected version {expected_version}, found {found_version}")]
    Conflict {
        provider_pid: String,
        expected_version: u64,
        found_version: u64,
    },

    /// Saving a record that was never created.
    #[error("negotiation not found: {0}")]
    NotFound(String),

    /// The identifier service produced an identifier already in use.
    #[error("provider pid already in use: {0}")]
    DuplicateProviderPid(String),

    /// `consumerPid` is immutable after creation.
    #[error("consumer pid of negotiation {0} cannot change")]
    ConsumerPidChanged(String),

    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for NegotiationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                provider_pid,
                expected_version,
                ..
            } => NegotiationError::Conflict {
                provider_pid,
                expected_version,
            },
            StoreError::NotFound(pid) => NegotiationError::not_found(pid),
            other => NegotiationError::Storage(other.to_string()),
        }
    }
}

/// Durable keyed storage for negotiation records.
///
/// Implementations must be `Send + Sync + 'static` so a single instance can
/// be shared across request handlers.
#[async_trait]
pub trait NegotiationStore: Send + Sync + 'static {
    async fn find_by_provider_pid(
        &self,
        provider_pid: &str,
    ) -> Result<Option<NegotiationRecord>, StoreError>;

    /// Most recently created record carrying `consumer_pid`.
    async fn find_by_consumer_pid(
        &self,
        consumer_pid: &str,
    ) -> Result<Option<NegotiationRecord>, StoreError>;

    /// Mint a `providerPid`, persist a new record and return it.
    async fn create(
        &self,
        consumer_pid: &str,
        initial_state: NegotiationState,
    ) -> Result<NegotiationRecord, StoreError>;

    /// Persist `record` if its version matches the stored one. Returns the
    /// record as stored, with its version advanced.
    async fn save(&self, record: NegotiationRecord) -> Result<NegotiationRecord, StoreError>;
}

/// Records plus the consumer index; shared by the memory and file backends.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordTable {
    by_provider: HashMap<String, NegotiationRecord>,
    /// `consumerPid` -> `providerPid`s in creation order.
    by_consumer: HashMap<String, Vec<String>>,
    /// Every `providerPid` in creation order.
    created: Vec<String>,
}

/// On-disk form of a [`RecordTable`]. `records` is in creation order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct TableSnapshot {
    pub(crate) records: Vec<NegotiationRecord>,
}

impl RecordTable {
    pub(crate) fn from_snapshot(snapshot: TableSnapshot) -> Result<Self, StoreError> {
        let mut table = Self::default();
        for record in snapshot.records {
            table.insert_new(record)?;
        }
        Ok(table)
    }

    pub(crate) fn to_snapshot(&self) -> TableSnapshot {
        let records = self
            .created
            .iter()
            .filter_map(|pid| self.by_provider.get(pid))
            .cloned()
            .collect();
        TableSnapshot { records }
    }

    pub(crate) fn get(&self, provider_pid: &str) -> Option<&NegotiationRecord> {
        self.by_provider.get(provider_pid)
    }

    pub(crate) fn latest_for_consumer(&self, consumer_pid: &str) -> Option<&NegotiationRecord> {
        self.by_consumer
            .get(consumer_pid)
            .and_then(|pids| pids.last())
            .and_then(|pid| self.by_provider.get(pid))
    }

    pub(crate) fn insert_new(&mut self, record: NegotiationRecord) -> Result<(), StoreError> {
        let provider_pid = record.provider_pid().to_string();
        if self.by_provider.contains_key(&provider_pid) {
            return Err(StoreError::DuplicateProviderPid(provider_pid));
        }
        self.by_consumer
            .entry(record.consumer_pid.clone())
            .or_default()
            .push(provider_pid.clone());
        self.created.push(provider_pid.clone());
        self.by_provider.insert(provider_pid, record);
        Ok(())
    }

    pub(crate) fn update(
        &mut self,
        mut record: NegotiationRecord,
    ) -> Result<NegotiationRecord, StoreError> {
        let provider_pid = record.provider_pid().to_string();
        let stored = self
            .by_provider
            .get_mut(&provider_pid)
            .ok_or_else(|| StoreError::NotFound(provider_pid.clone()))?;

        if stored.version != record.version {
            return Err(StoreError::Conflict {
                provider_pid,
                expected_version: record.version,
                found_version: stored.version,
            });
        }
        if stored.consumer_pid != record.consumer_pid {
            return Err(StoreError::ConsumerPidChanged(provider_pid));
        }

        record.version += 1;
        *stored = record.clone();
        Ok(record)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_provider.len()
    }
}

/// In-memory store. State is lost on restart.
pub struct MemoryStore {
    table: RwLock<RecordTable>,
    minter: Box<dyn IdentifierService>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_minter(Box::new(UrnUuidMinter))
    }

    pub fn with_minter(minter: Box<dyn IdentifierService>) -> Self {
        Self {
            table: RwLock::new(RecordTable::default()),
            minter,
        }
    }

    /// Number of stored negotiations.
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NegotiationStore for MemoryStore {
    async fn find_by_provider_pid(
        &self,
        provider_pid: &str,
    ) -> Result<Option<NegotiationRecord>, StoreError> {
        Ok(self.table.read().await.get(provider_pid).cloned())
    }

    async fn find_by_consumer_pid(
        &self,
        consumer_pid: &str,
    ) -> Result<Option<NegotiationRecord>, StoreError> {
        Ok(self
            .table
            .read()
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
        self.table.write().await.insert_new(record.clone())?;
        Ok(record)
    }

    async fn save(&self, record: NegotiationRecord) -> Result<NegotiationRecord, StoreError> {
        self.table.write().await.update(record)
    }
}

/// Open the store described by `config`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn NegotiationStore>, StoreError> {
    match config {
        StoreConfig::Memory => {
            tracing::info!("Using in-memory negotiation store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::File(path) => {
            let store = FileStore::open(path).await?;
            tracing::info!(
                "Using file negotiation store at {} ({} records)",
                path.display(),
                store.len().await
            );
            Ok(Arc::new(store))
        }
    }
}
