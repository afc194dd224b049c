//! # realmdb Core
//!
//! Transactional layer of realmdb.
//!
//! This crate provides:
//! - [`EntityStore`] - a typed store facade over a pluggable backend
//! - [`Transaction`] - request-scoped read/write buffering with
//!   read-your-writes and atomic commit/rollback
//! - [`EntityHandle`] - change tracking: in-place mutations are staged
//!   into the owning transaction without explicit re-save
//! - [`EventBus`] - explicit, synchronous domain-event delivery

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod events;
mod store;
mod tracked;
mod transaction;

pub use error::{CoreError, CoreResult};
pub use events::{EventBus, StoreEvent, SubscriberError};
pub use store::EntityStore;
pub use tracked::EntityHandle;
pub use transaction::{Transaction, TransactionState};
