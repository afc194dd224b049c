//! Request-scoped transactions over an entity backend.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use realmdb_storage::{
    EntityBackend, QueryParams, Searchable, StorageError, StoreEntity, WriteOp,
};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::tracked::{EntityHandle, Tracked};

/// State of a transaction.
///
/// `Committed` and `RolledBack` are terminal; every operation attempted
/// afterwards fails with `TransactionClosed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Shared transaction state; handles keep a reference to observe the
/// terminal state and to stage their dirty entities.
pub(crate) struct TxInner<E: StoreEntity> {
    pub(crate) state: TransactionState,
    /// Every entity this transaction has seen, keyed by entity key.
    /// One `Tracked` cell per logical entity gives identity-consistent
    /// handles.
    tracked: HashMap<E::Key, Rc<RefCell<Tracked<E>>>>,
    /// Keys created in this transaction (subset of `tracked`).
    created: HashSet<E::Key>,
    /// Tombstones for entities persisted in the backend.
    deleted: HashSet<E::Key>,
    /// Memoized read misses, so one transaction keeps one logical view
    /// even when other transactions commit concurrently.
    misses: HashSet<E::Key>,
}

impl<E: StoreEntity> TxInner<E> {
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            state => Err(CoreError::transaction_closed(state)),
        }
    }
}

/// A request-scoped read/write buffer layered on an entity backend.
///
/// A transaction always observes its own buffered writes
/// (read-your-writes); it has no visibility of other transactions'
/// uncommitted writes. Buffered effects apply atomically at commit.
///
/// Transactions belong to one request thread and are deliberately not
/// `Send`: entities read through a transaction are shared, reference
/// counted views. Exactly one of [`Transaction::commit`] or
/// [`Transaction::rollback`] consumes the transaction; dropping an
/// active transaction is an implicit rollback.
pub struct Transaction<E: StoreEntity + Searchable> {
    backend: Arc<dyn EntityBackend<E>>,
    inner: Rc<RefCell<TxInner<E>>>,
}

impl<E: StoreEntity + Searchable> Transaction<E> {
    pub(crate) fn new(backend: Arc<dyn EntityBackend<E>>) -> Self {
        Self {
            backend,
            inner: Rc::new(RefCell::new(TxInner {
                state: TransactionState::Active,
                tracked: HashMap::new(),
                created: HashSet::new(),
                deleted: HashSet::new(),
                misses: HashSet::new(),
            })),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.borrow().state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Reads an entity by key.
    ///
    /// The locally buffered version wins over the backend, and the result
    /// (hit or miss) is memoized per key, so repeated reads within one
    /// transaction return the same logical view and the same shared
    /// handle.
    pub fn read(&self, key: &E::Key) -> CoreResult<Option<EntityHandle<E>>> {
        {
            let inner = self.inner.borrow();
            inner.ensure_active()?;
            if inner.deleted.contains(key) && !inner.created.contains(key) {
                return Ok(None);
            }
            if let Some(cell) = inner.tracked.get(key) {
                return Ok(Some(EntityHandle::new(
                    Rc::clone(&self.inner),
                    Rc::clone(cell),
                )));
            }
            if inner.misses.contains(key) {
                return Ok(None);
            }
        }

        match self.backend.read(key)? {
            Some(entity) => {
                let mut inner = self.inner.borrow_mut();
                let cell = Rc::new(RefCell::new(Tracked::new(entity)));
                inner.tracked.insert(key.clone(), Rc::clone(&cell));
                Ok(Some(EntityHandle::new(Rc::clone(&self.inner), cell)))
            }
            None => {
                self.inner.borrow_mut().misses.insert(key.clone());
                Ok(None)
            }
        }
    }

    /// Reads entities matching the criteria.
    ///
    /// Backend results are folded together with locally buffered
    /// creations; buffered deletions are excluded even while still
    /// physically present. Ordering and pagination apply after the merge,
    /// so the slice is computed over the transaction's logical view.
    pub fn read_by(&self, params: &QueryParams<E>) -> CoreResult<Vec<EntityHandle<E>>> {
        self.inner.borrow().ensure_active()?;

        let backend_params = QueryParams::with_criteria(params.criteria().clone());
        let from_store = self.backend.query(&backend_params)?;

        let mut merged: Vec<E> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            let mut seen: HashSet<E::Key> = HashSet::new();

            for entity in from_store {
                let key = entity.key().clone();
                if inner.deleted.contains(&key) && !inner.created.contains(&key) {
                    continue;
                }
                let cell = inner
                    .tracked
                    .entry(key.clone())
                    .or_insert_with(|| Rc::new(RefCell::new(Tracked::new(entity))));
                merged.push(cell.borrow().current.clone());
                seen.insert(key);
            }

            for key in &inner.created {
                if seen.contains(key) {
                    continue;
                }
                let current = inner.tracked[key].borrow().current.clone();
                if params.criteria().matches(&current) {
                    merged.push(current);
                }
            }
        }

        let resolved = params.resolve(merged);
        let inner = self.inner.borrow();
        Ok(resolved
            .into_iter()
            .map(|entity| {
                EntityHandle::new(
                    Rc::clone(&self.inner),
                    Rc::clone(&inner.tracked[entity.key()]),
                )
            })
            .collect())
    }

    /// Buffers a new entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateKey` (wrapped) if the key exists
    /// locally or in the backing store.
    pub fn create(&self, entity: E) -> CoreResult<EntityHandle<E>> {
        let key = entity.key().clone();
        {
            let inner = self.inner.borrow();
            inner.ensure_active()?;
            if inner.created.contains(&key) || inner.tracked.contains_key(&key) {
                return Err(StorageError::duplicate_key(format!("{key:?}")).into());
            }
            // A pending tombstone frees the key for re-creation.
            if !inner.deleted.contains(&key)
                && !inner.misses.contains(&key)
                && self.backend.read(&key)?.is_some()
            {
                return Err(StorageError::duplicate_key(format!("{key:?}")).into());
            }
        }

        let mut inner = self.inner.borrow_mut();
        inner.misses.remove(&key);
        let cell = Rc::new(RefCell::new(Tracked::new(entity)));
        inner.tracked.insert(key.clone(), Rc::clone(&cell));
        inner.created.insert(key);
        Ok(EntityHandle::new(Rc::clone(&self.inner), cell))
    }

    /// Buffers a tombstone for a key. No prior read is required.
    pub fn delete(&self, key: &E::Key) -> CoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_active()?;
        inner.tracked.remove(key);
        if !inner.created.remove(key) {
            // Not a local create, so the backend row (if any) needs a
            // tombstone at commit.
            inner.deleted.insert(key.clone());
        }
        Ok(())
    }

    /// Applies all buffered effects atomically and closes the transaction.
    ///
    /// Either every buffered create/update/delete lands in the backend or
    /// none does. On failure the transaction rolls back.
    pub fn commit(self) -> CoreResult<()> {
        let ops = {
            let inner = self.inner.borrow();
            inner.ensure_active()?;

            let mut ops: Vec<WriteOp<E>> = Vec::new();
            for key in &inner.deleted {
                ops.push(WriteOp::Delete(key.clone()));
            }
            for (key, cell) in &inner.tracked {
                let tracked = cell.borrow();
                if inner.created.contains(key) {
                    ops.push(WriteOp::Create(tracked.current.clone()));
                } else if tracked.dirty {
                    ops.push(WriteOp::Put(tracked.current.clone()));
                }
            }
            ops
        };

        // On error the transaction drops while still active, which marks
        // it rolled back.
        self.backend.apply(ops)?;

        let mut inner = self.inner.borrow_mut();
        inner.state = TransactionState::Committed;
        debug!(
            writes = inner.created.len(),
            deletes = inner.deleted.len(),
            "transaction committed"
        );
        Ok(())
    }

    /// Discards the buffer and closes the transaction. The backend is
    /// left untouched.
    pub fn rollback(self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == TransactionState::Active {
            inner.state = TransactionState::RolledBack;
            debug!("transaction rolled back");
        }
    }
}

impl<E: StoreEntity + Searchable> Drop for Transaction<E> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == TransactionState::Active {
            // Abandoning a transaction is an implicit rollback.
            inner.state = TransactionState::RolledBack;
            debug!("active transaction dropped; rolled back");
        }
    }
}

impl<E: StoreEntity + Searchable> fmt::Debug for Transaction<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Transaction")
            .field("state", &inner.state)
            .field("tracked", &inner.tracked.len())
            .field("created", &inner.created.len())
            .field("deleted", &inner.deleted.len())
            .finish()
    }
}
