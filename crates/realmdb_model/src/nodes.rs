//! Ephemeral registry of cluster nodes that announced themselves for a
//! client.
//!
//! Node registrations are liveness data, not configuration: they are
//! written outside any transaction, visible immediately, and never
//! rolled back. Concurrent registrations resolve last-write-wins per
//! host name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

type NodeMap = HashMap<String, i64>;

/// Shared side table mapping a client key to its registered nodes.
///
/// Cloning is cheap and every clone observes the same table.
#[derive(Debug, Clone, Default)]
pub struct RegisteredNodes {
    inner: Arc<RwLock<HashMap<Uuid, NodeMap>>>,
}

impl RegisteredNodes {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a node announcement, overwriting any previous timestamp
    /// for the same host.
    pub fn register(&self, client: Uuid, host: &str, registration_time: i64) {
        self.inner
            .write()
            .entry(client)
            .or_default()
            .insert(host.to_owned(), registration_time);
    }

    /// Removes one host's registration. Returns false when absent.
    pub fn unregister(&self, client: Uuid, host: &str) -> bool {
        let mut table = self.inner.write();
        let Some(nodes) = table.get_mut(&client) else {
            return false;
        };
        let removed = nodes.remove(host).is_some();
        if nodes.is_empty() {
            table.remove(&client);
        }
        removed
    }

    /// Snapshot of a client's registered nodes, host to announce time.
    #[must_use]
    pub fn nodes_of(&self, client: Uuid) -> NodeMap {
        self.inner.read().get(&client).cloned().unwrap_or_default()
    }

    /// Drops every registration for a client. Called when the client
    /// itself is removed.
    pub fn forget_client(&self, client: Uuid) {
        self.inner.write().remove(&client);
    }
}
