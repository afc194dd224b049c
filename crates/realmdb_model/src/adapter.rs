//! Change-tracking adapter over a client entity.
//!
//! The adapter wraps a transaction-owned [`EntityHandle`] and exposes
//! typed accessors. Every mutation goes through the handle, so the
//! transaction picks it up at commit without an explicit save call.
//! Node registration passes through to the ephemeral side table and
//! deliberately bypasses the transaction.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use realmdb_core::{EntityHandle, EventBus, StoreEvent};
use tracing::trace;
use uuid::Uuid;

use crate::client::{ClientEntity, Protocol};
use crate::error::ModelResult;
use crate::nodes::RegisteredNodes;

/// A live view of one client inside a provider's transaction.
pub struct ClientAdapter {
    id: String,
    handle: EntityHandle<ClientEntity>,
    events: Arc<EventBus<ClientEntity>>,
    nodes: RegisteredNodes,
}

impl ClientAdapter {
    pub(crate) fn new(
        id: String,
        handle: EntityHandle<ClientEntity>,
        events: Arc<EventBus<ClientEntity>>,
        nodes: RegisteredNodes,
    ) -> Self {
        Self {
            id,
            handle,
            events,
            nodes,
        }
    }

    /// The client's key in its external string form.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The client's store key.
    #[must_use]
    pub fn key(&self) -> Uuid {
        self.handle.key()
    }

    /// A point-in-time copy of the tracked entity state.
    #[must_use]
    pub fn snapshot(&self) -> ClientEntity {
        self.handle.snapshot()
    }

    /// Whether two adapters view the same tracked entity.
    #[must_use]
    pub fn same_client(&self, other: &Self) -> bool {
        self.handle.same_entity(&other.handle)
    }

    /// The business key.
    #[must_use]
    pub fn client_id(&self) -> String {
        self.handle.with(|c| c.client_id.clone())
    }

    /// Changes the business key.
    pub fn set_client_id(&self, client_id: &str) -> ModelResult<()> {
        self.handle
            .update(|c| c.client_id = client_id.to_owned())?;
        Ok(())
    }

    /// Whether the client participates in login flows.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.handle.with(|c| c.enabled)
    }

    /// Enables or disables the client.
    pub fn set_enabled(&self, enabled: bool) -> ModelResult<()> {
        self.handle.update(|c| c.enabled = enabled)?;
        Ok(())
    }

    /// Whether the standard authorization-code flow is allowed.
    #[must_use]
    pub fn is_standard_flow_enabled(&self) -> bool {
        self.handle.with(|c| c.standard_flow_enabled)
    }

    /// Allows or forbids the standard authorization-code flow.
    pub fn set_standard_flow_enabled(&self, enabled: bool) -> ModelResult<()> {
        self.handle.update(|c| c.standard_flow_enabled = enabled)?;
        Ok(())
    }

    /// The protocol the client speaks.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.handle.with(|c| c.protocol)
    }

    /// Switches the client's protocol.
    pub fn set_protocol(&self, protocol: Protocol) -> ModelResult<()> {
        self.handle.update(|c| c.protocol = protocol)?;
        Ok(())
    }

    /// The configured redirect URIs.
    #[must_use]
    pub fn redirect_uris(&self) -> BTreeSet<String> {
        self.handle.with(|c| c.redirect_uris.clone())
    }

    /// Adds a redirect URI.
    pub fn add_redirect_uri(&self, uri: &str) -> ModelResult<()> {
        self.handle
            .update(|c| c.redirect_uris.insert(uri.to_owned()))?;
        Ok(())
    }

    /// Removes a redirect URI.
    pub fn remove_redirect_uri(&self, uri: &str) -> ModelResult<()> {
        self.handle.update(|c| c.redirect_uris.remove(uri))?;
        Ok(())
    }

    /// The role ids granted through scope mappings.
    #[must_use]
    pub fn scope_mapping_roles(&self) -> BTreeSet<Uuid> {
        self.handle.with(|c| c.scope_mapping_roles.clone())
    }

    /// Grants a role through a scope mapping.
    pub fn add_scope_mapping(&self, role_id: Uuid) -> ModelResult<()> {
        self.handle.update(|c| c.add_scope_mapping(role_id))?;
        Ok(())
    }

    /// Revokes a scope-mapping role.
    pub fn delete_scope_mapping(&self, role_id: &Uuid) -> ModelResult<()> {
        self.handle.update(|c| {
            c.delete_scope_mapping(role_id);
        })?;
        Ok(())
    }

    /// Publishes an update notification carrying the current state.
    ///
    /// Configuration consumers (caches, protocol frontends) listen for
    /// this rather than polling; call it after a batch of setter calls.
    pub fn update_client(&self) {
        let snapshot = self.handle.snapshot();
        trace!(client = %snapshot.client_id, "update_client");
        self.events.publish(&StoreEvent::Updated(snapshot));
    }

    /// Announces a cluster node for this client. Takes effect
    /// immediately, outside the transaction.
    pub fn register_node(&self, host: &str, registration_time: i64) {
        self.nodes.register(self.key(), host, registration_time);
    }

    /// Withdraws a cluster node announcement.
    pub fn unregister_node(&self, host: &str) -> bool {
        self.nodes.unregister(self.key(), host)
    }

    /// The currently announced nodes, host name to announce time.
    #[must_use]
    pub fn registered_nodes(&self) -> HashMap<String, i64> {
        self.nodes.nodes_of(self.key())
    }
}

impl std::fmt::Debug for ClientAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAdapter").field("id", &self.id).finish()
    }
}
