//! Entity backend trait definition.

use crate::criteria::{Criteria, QueryParams, Searchable};
use crate::error::StorageResult;
use crate::key::StoreKey;

/// An entity stored by a backend.
///
/// The key is unique within the store and immutable after creation.
pub trait StoreEntity: Clone + Send + Sync + 'static {
    /// The key type, chosen by the concrete instantiation.
    type Key: StoreKey;

    /// Returns the entity's key.
    fn key(&self) -> &Self::Key;
}

/// One operation of a transaction's write set.
#[derive(Debug, Clone)]
pub enum WriteOp<E: StoreEntity> {
    /// Persist a new entity; fails the batch if the key exists.
    Create(E),
    /// Persist the current version of an already-stored entity.
    Put(E),
    /// Remove an entity; a missing key is not an error.
    Delete(E::Key),
}

/// A pluggable storage engine holding entities of one type.
///
/// This is the primary extension seam: any engine that can implement
/// create/read/delete/count plus criteria resolution can be substituted.
/// The bundled engines are [`super::MemoryBackend`] and
/// [`super::FileBackend`].
///
/// # Invariants
///
/// - `create` is fail-fast on duplicates; it never blocks waiting for a
///   key to become free
/// - `count` with some criteria equals the number of items `query` yields
///   for the same criteria
/// - `query` results are a snapshot: stable for the duration of one read,
///   unaffected by concurrent writes
/// - `apply` is atomic: either every op of the batch lands or none does
/// - Backends must be `Send + Sync`; operations on disjoint keys never
///   block each other beyond short internal critical sections
pub trait EntityBackend<E: StoreEntity + Searchable>: Send + Sync {
    /// Persists a new entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateKey` if the key is already present.
    fn create(&self, entity: E) -> StorageResult<()>;

    /// Reads an entity by key. Absence is `None`, not an error.
    fn read(&self, key: &E::Key) -> StorageResult<Option<E>>;

    /// Reads entities matching the criteria, ordered and paginated.
    ///
    /// The result is finite and restartable; when no order is requested
    /// iteration is in key order.
    fn query(&self, params: &QueryParams<E>) -> StorageResult<Vec<E>>;

    /// Deletes an entity by key.
    ///
    /// Idempotent; returns whether an entity was actually removed.
    fn delete(&self, key: &E::Key) -> StorageResult<bool>;

    /// Counts entities matching the criteria.
    fn count(&self, criteria: &Criteria<E>) -> StorageResult<usize>;

    /// Applies a transaction's write set atomically.
    ///
    /// Duplicate validation for `Create` ops happens against the view
    /// with the batch's `Delete` ops already taken out, so deleting and
    /// re-creating one key in a single batch acts as replacement.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateKey` (and applies nothing) if any
    /// `Create` collides.
    fn apply(&self, ops: Vec<WriteOp<E>>) -> StorageResult<()>;
}
