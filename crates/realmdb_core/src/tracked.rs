//! Change-tracking entity handle.

use std::cell::RefCell;
use std::rc::Rc;

use realmdb_storage::StoreEntity;

use crate::error::CoreResult;
use crate::transaction::TxInner;

/// Tracked state of one entity inside a transaction.
pub(crate) struct Tracked<E> {
    pub(crate) current: E,
    pub(crate) dirty: bool,
}

impl<E> Tracked<E> {
    pub(crate) fn new(entity: E) -> Self {
        Self {
            current: entity,
            dirty: false,
        }
    }
}

/// A mutable view over an entity retrieved through a transaction.
///
/// Any mutation through [`EntityHandle::update`] marks the entity dirty
/// and stages it for the transaction's next commit; callers never
/// re-submit the entity explicitly. Requesting the same logical entity
/// twice from one transaction yields handles sharing the same tracked
/// state, so every view of the entity is identity-consistent.
///
/// Handles are only valid while the owning transaction is active;
/// mutation after commit or rollback fails with `TransactionClosed`.
/// Like the transaction itself, handles stay on the request thread.
pub struct EntityHandle<E: StoreEntity> {
    tx: Rc<RefCell<TxInner<E>>>,
    cell: Rc<RefCell<Tracked<E>>>,
}

impl<E: StoreEntity> EntityHandle<E> {
    pub(crate) fn new(tx: Rc<RefCell<TxInner<E>>>, cell: Rc<RefCell<Tracked<E>>>) -> Self {
        Self { tx, cell }
    }

    /// Reads through the handle without cloning the entity.
    pub fn with<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.cell.borrow().current)
    }

    /// Returns a clone of the entity's current state.
    #[must_use]
    pub fn snapshot(&self) -> E {
        self.cell.borrow().current.clone()
    }

    /// Returns the entity's key.
    #[must_use]
    pub fn key(&self) -> E::Key {
        self.cell.borrow().current.key().clone()
    }

    /// Mutates the entity, marking it dirty for the next commit.
    ///
    /// The closure must not change the entity's key; keys are immutable
    /// after creation.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::TransactionClosed` when the owning transaction
    /// has already committed or rolled back.
    pub fn update<R>(&self, f: impl FnOnce(&mut E) -> R) -> CoreResult<R> {
        self.tx.borrow().ensure_active()?;
        let mut tracked = self.cell.borrow_mut();
        tracked.dirty = true;
        let key = tracked.current.key().clone();
        let result = f(&mut tracked.current);
        debug_assert_eq!(*tracked.current.key(), key, "entity keys are immutable");
        Ok(result)
    }

    /// Whether the entity has staged mutations.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.cell.borrow().dirty
    }

    /// Whether two handles are views of the same tracked entity.
    #[must_use]
    pub fn same_entity(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<E: StoreEntity> Clone for EntityHandle<E> {
    fn clone(&self) -> Self {
        Self {
            tx: Rc::clone(&self.tx),
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<E: StoreEntity + std::fmt::Debug> std::fmt::Debug for EntityHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tracked = self.cell.borrow();
        f.debug_struct("EntityHandle")
            .field("entity", &tracked.current)
            .field("dirty", &tracked.dirty)
            .finish()
    }
}
