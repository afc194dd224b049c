//! Entity store facade.

use std::sync::Arc;

use realmdb_storage::{
    Criteria, EntityBackend, KeyConvertor, QueryParams, Searchable, StoreEntity,
};

use crate::error::CoreResult;
use crate::transaction::Transaction;

/// A store for one entity type: a pluggable backend paired with the key
/// convertor that canonically encodes its keys.
///
/// The store hands out per-request [`Transaction`]s; direct reads bypass
/// any transaction and see only committed state.
pub struct EntityStore<E: StoreEntity + Searchable> {
    backend: Arc<dyn EntityBackend<E>>,
    convertor: Arc<dyn KeyConvertor<E::Key>>,
}

impl<E: StoreEntity + Searchable> EntityStore<E> {
    /// Creates a store over a backend and key convertor.
    pub fn new(
        backend: Arc<dyn EntityBackend<E>>,
        convertor: Arc<dyn KeyConvertor<E::Key>>,
    ) -> Self {
        Self { backend, convertor }
    }

    /// The key convertor for this store's key type.
    pub fn key_convertor(&self) -> &dyn KeyConvertor<E::Key> {
        self.convertor.as_ref()
    }

    /// Begins a new request-scoped transaction.
    #[must_use]
    pub fn begin(&self) -> Transaction<E> {
        Transaction::new(Arc::clone(&self.backend))
    }

    /// Reads the committed version of an entity.
    pub fn read(&self, key: &E::Key) -> CoreResult<Option<E>> {
        Ok(self.backend.read(key)?)
    }

    /// Reads committed entities matching the criteria.
    pub fn query(&self, params: &QueryParams<E>) -> CoreResult<Vec<E>> {
        Ok(self.backend.query(params)?)
    }

    /// Counts committed entities matching the criteria.
    ///
    /// Equals the number of items [`EntityStore::query`] yields for the
    /// same criteria.
    pub fn count(&self, criteria: &Criteria<E>) -> CoreResult<usize> {
        Ok(self.backend.count(criteria)?)
    }
}

impl<E: StoreEntity + Searchable> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            convertor: Arc::clone(&self.convertor),
        }
    }
}

impl<E: StoreEntity + Searchable> std::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore").finish_non_exhaustive()
    }
}
