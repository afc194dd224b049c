//! In-memory entity backend.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::backend::{EntityBackend, StoreEntity, WriteOp};
use crate::criteria::{Criteria, QueryParams, Searchable};
use crate::error::{StorageError, StorageResult};

/// An in-memory entity backend.
///
/// Entities live in a key-ordered map behind a read/write lock, which
/// makes unordered queries iterate deterministically in key order. This
/// backend is suitable for:
/// - Unit and integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// The backend is thread-safe. Writes are fail-fast duplicate checks
/// under a short write lock; nothing blocks indefinitely.
pub struct MemoryBackend<E: StoreEntity> {
    entries: RwLock<BTreeMap<E::Key, E>>,
}

impl<E: StoreEntity> MemoryBackend<E> {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when no entities are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<E: StoreEntity> Default for MemoryBackend<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates the creates of a batch against a key set with the batch's
/// deletes already taken out.
pub(crate) fn validate_batch<E: StoreEntity>(
    present: &BTreeSet<E::Key>,
    ops: &[WriteOp<E>],
) -> StorageResult<()> {
    let mut after_deletes = present.clone();
    for op in ops {
        if let WriteOp::Delete(key) = op {
            after_deletes.remove(key);
        }
    }
    for op in ops {
        if let WriteOp::Create(entity) = op {
            if !after_deletes.insert(entity.key().clone()) {
                return Err(StorageError::duplicate_key(format!("{:?}", entity.key())));
            }
        }
    }
    Ok(())
}

impl<E: StoreEntity + Searchable> EntityBackend<E> for MemoryBackend<E> {
    fn create(&self, entity: E) -> StorageResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(entity.key()) {
            return Err(StorageError::duplicate_key(format!("{:?}", entity.key())));
        }
        entries.insert(entity.key().clone(), entity);
        Ok(())
    }

    fn read(&self, key: &E::Key) -> StorageResult<Option<E>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn query(&self, params: &QueryParams<E>) -> StorageResult<Vec<E>> {
        let matched: Vec<E> = self
            .entries
            .read()
            .values()
            .filter(|e| params.criteria().matches(e))
            .cloned()
            .collect();
        Ok(params.resolve(matched))
    }

    fn delete(&self, key: &E::Key) -> StorageResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn count(&self, criteria: &Criteria<E>) -> StorageResult<usize> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| criteria.matches(e))
            .count())
    }

    fn apply(&self, ops: Vec<WriteOp<E>>) -> StorageResult<()> {
        let mut entries = self.entries.write();

        // Validate before mutating so a failed batch applies nothing.
        let present: BTreeSet<E::Key> = entries.keys().cloned().collect();
        validate_batch(&present, &ops)?;

        for op in &ops {
            if let WriteOp::Delete(key) = op {
                entries.remove(key);
            }
        }
        for op in ops {
            match op {
                WriteOp::Create(entity) | WriteOp::Put(entity) => {
                    entries.insert(entity.key().clone(), entity);
                }
                WriteOp::Delete(_) => {}
            }
        }
        Ok(())
    }
}
