use super::{error::Result, error::StorageError, CheckpointStore, RetryCheckpoint};
use crate::core::{deserialize_value, serialize_value};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// In-memory checkpoint store using DashMap for concurrent access.
///
/// Checkpoints are kept in their serialized form so this backend exercises
/// the same encode/decode path a persistent backend would.
///
/// Reference: https://github.com/xacrimon/dashmap
/// DashMap provides concurrent access through sharding, eliminating
/// the bottleneck of a single mutex.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<Uuid, Vec<u8>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    fn decode(key: Uuid, bytes: &[u8]) -> Result<RetryCheckpoint> {
        let checkpoint: RetryCheckpoint = deserialize_value(bytes)?;
        if checkpoint.flow_id != key {
            return Err(StorageError::Mismatch {
                key,
                found: checkpoint.flow_id,
            });
        }
        Ok(checkpoint)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &RetryCheckpoint) -> Result<()> {
        let bytes = serialize_value(checkpoint)?;
        self.checkpoints.insert(checkpoint.flow_id, bytes);
        Ok(())
    }

    async fn load(&self, flow_id: Uuid) -> Result<Option<RetryCheckpoint>> {
        match self.checkpoints.get(&flow_id) {
            Some(entry) => Self::decode(flow_id, entry.value()).map(Some),
            None => Ok(None),
        }
    }

    async fn remove(&self, flow_id: Uuid) -> Result<bool> {
        Ok(self.checkpoints.remove(&flow_id).is_some())
    }

    async fn list(&self) -> Result<Vec<RetryCheckpoint>> {
        // Collect bytes first so no shard lock is held while decoding
        let entries: Vec<(Uuid, Vec<u8>)> = self
            .checkpoints
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut checkpoints = entries
            .iter()
            .map(|(key, bytes)| Self::decode(*key, bytes))
            .collect::<Result<Vec<_>>>()?;
        checkpoints.sort_by_key(|c| c.updated_at);
        Ok(checkpoints)
    }
}
