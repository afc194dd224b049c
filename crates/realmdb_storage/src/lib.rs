//! # realmdb Storage
//!
//! Backend contract and bundled backends for realmdb.
//!
//! This crate defines the pluggable storage seam: any engine that can
//! implement create/read/delete/count plus criteria resolution can back a
//! realmdb store.
//!
//! ## Design Principles
//!
//! - Backends hold entities keyed by an opaque key type and resolve
//!   [`Criteria`] filters however suits the engine
//! - All duplicate/not-found checks are fail-fast; nothing blocks
//!   indefinitely
//! - Backends must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - for testing and ephemeral stores
//! - [`FileBackend`] - JSON-snapshot persistence over OS file APIs

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod criteria;
mod error;
mod file;
mod key;
mod memory;

pub use backend::{EntityBackend, StoreEntity, WriteOp};
pub use criteria::{
    Criteria, Criterion, FieldKind, FieldValue, Operator, Order, QueryParams, Searchable,
};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use key::{KeyConvertor, StoreKey, UuidConvertor};
pub use memory::MemoryBackend;
