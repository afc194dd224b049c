//! Domain providers for realm clients and roles, built on the
//! `realmdb` store.
//!
//! This crate is the worked example of the storage abstraction: a
//! multi-tenant client registry with request-scoped providers. A
//! request constructs a [`ClientProvider`] (and a [`RoleProvider`] for
//! the removal cascade), performs reads and buffered writes through
//! adapters, and terminates each provider exactly once with commit or
//! rollback. Cross-component notifications flow through an
//! [`EventBus`](realmdb_core::EventBus); node registrations live in the
//! ephemeral [`RegisteredNodes`] side table outside the transactional
//! world.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod client;
mod error;
mod nodes;
mod provider;
mod removal;
mod role;

pub use adapter::ClientAdapter;
pub use client::{ClientEntity, ClientField, ClientScope, Protocol};
pub use error::{ModelError, ModelResult};
pub use nodes::RegisteredNodes;
pub use provider::ClientProvider;
pub use removal::{ClientDependent, RemovalCascade};
pub use role::{RoleEntity, RoleField, RoleProvider};
