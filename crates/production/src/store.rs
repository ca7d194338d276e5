//! In-memory entity store.

use crate::error::StoreError;
use crate::traits::EntityStore;
use async_trait::async_trait;
use cosign_sync::{Diff, Reconcilable, ScopeKey};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Entity cache held in memory, partitioned by scope.
///
/// A commit builds the new partition on a copy and swaps it in under the
/// write lock, so readers see either the old or the new partition, never a
/// half-applied batch.
pub struct MemoryEntityStore<E: Reconcilable> {
    partitions: RwLock<HashMap<ScopeKey, IndexMap<E::Key, E>>>,
}

impl<E: Reconcilable> Default for MemoryEntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Reconcilable> MemoryEntityStore<E> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store with `entities` already cached in `scope`.
    pub fn with_entities(scope: ScopeKey, entities: Vec<E>) -> Self {
        let store = Self::new();
        store.replace(scope, entities);
        store
    }

    /// Overwrite a partition.
    pub fn replace(&self, scope: ScopeKey, entities: Vec<E>) {
        let partition = entities.into_iter().map(|e| (e.key(), e)).collect();
        self.partitions.write().insert(scope, partition);
    }

    /// Snapshot of a partition, in insertion order.
    pub fn snapshot(&self, scope: &ScopeKey) -> Vec<E> {
        self.partitions
            .read()
            .get(scope)
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of entities cached in `scope`.
    pub fn len(&self, scope: &ScopeKey) -> usize {
        self.partitions.read().get(scope).map_or(0, IndexMap::len)
    }

    /// Whether `scope` has no cached entities.
    pub fn is_empty(&self, scope: &ScopeKey) -> bool {
        self.len(scope) == 0
    }
}

#[async_trait]
impl<E: Reconcilable> EntityStore<E> for MemoryEntityStore<E> {
    async fn load(&self, scope: &ScopeKey) -> Result<Vec<E>, StoreError> {
        Ok(self.snapshot(scope))
    }

    async fn commit(&self, scope: &ScopeKey, diff: &Diff<E>) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write();
        let mut next = partitions.get(scope).cloned().unwrap_or_default();

        for entity in &diff.to_delete {
            next.shift_remove(&entity.key());
        }
        for entity in diff.to_update.iter().chain(&diff.to_insert) {
            next.insert(entity.key(), entity.clone());
        }

        partitions.insert(scope.clone(), next);
        debug!(
            scope = %scope,
            insert = diff.to_insert.len(),
            update = diff.to_update.len(),
            delete = diff.to_delete.len(),
            "Committed batch"
        );
        Ok(())
    }
}
