//! Per-request client provider.
//!
//! One provider serves one request: it begins a transaction on the
//! client store at construction, buffers every change in it, and the
//! request scope terminates it exactly once through
//! [`ClientProvider::commit`] or [`ClientProvider::rollback`]. All
//! lookups take the caller's realm and never return entities from
//! another realm, whatever key the caller supplies.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use realmdb_core::{CoreError, EntityHandle, EntityStore, EventBus, StoreEvent, Transaction};
use realmdb_storage::{Criteria, Operator, Order, QueryParams, StorageError};
use tracing::trace;
use uuid::Uuid;

use crate::adapter::ClientAdapter;
use crate::client::{ClientEntity, ClientField, ClientScope};
use crate::error::{ModelError, ModelResult};
use crate::nodes::RegisteredNodes;
use crate::removal::RemovalCascade;

/// Request-scoped access to the clients of a realm.
pub struct ClientProvider {
    store: EntityStore<ClientEntity>,
    tx: Transaction<ClientEntity>,
    events: Arc<EventBus<ClientEntity>>,
    nodes: RegisteredNodes,
    cascade: RemovalCascade,
}

impl ClientProvider {
    /// Opens a provider with a fresh transaction on the client store.
    #[must_use]
    pub fn new(
        store: EntityStore<ClientEntity>,
        events: Arc<EventBus<ClientEntity>>,
        nodes: RegisteredNodes,
        cascade: RemovalCascade,
    ) -> Self {
        let tx = store.begin();
        Self {
            store,
            tx,
            events,
            nodes,
            cascade,
        }
    }

    fn adapter(&self, handle: EntityHandle<ClientEntity>) -> ClientAdapter {
        let id = self.store.key_convertor().encode(&handle.key());
        ClientAdapter::new(
            id,
            handle,
            Arc::clone(&self.events),
            self.nodes.clone(),
        )
    }

    fn realm_criteria(realm_id: &str) -> ModelResult<Criteria<ClientEntity>> {
        Ok(Criteria::new().compare(ClientField::RealmId, Operator::Eq, realm_id)?)
    }

    /// Reads a handle by its external id, or `None` when the id is
    /// malformed, unknown, or owned by another realm.
    fn handle_in_realm(
        &self,
        realm_id: &str,
        id: &str,
    ) -> ModelResult<Option<EntityHandle<ClientEntity>>> {
        let Some(key) = self.store.key_convertor().decode_safe(id) else {
            return Ok(None);
        };
        let Some(handle) = self.tx.read(&key)? else {
            return Ok(None);
        };
        if handle.with(|c| c.realm_id != realm_id) {
            return Ok(None);
        }
        Ok(Some(handle))
    }

    /// Creates a client in the realm.
    ///
    /// When `id` is given it must be a well-formed key string; when
    /// `client_id` is omitted the encoded key doubles as the business
    /// key. The returned adapter is live in this provider's
    /// transaction. A `Created` event is published immediately,
    /// followed by the initial `Updated` notification that completes
    /// the registration.
    ///
    /// # Errors
    ///
    /// [`ModelError::DuplicateClient`] when the key or the business key
    /// is already taken in the realm.
    pub fn add(
        &self,
        realm_id: &str,
        id: Option<&str>,
        client_id: Option<&str>,
    ) -> ModelResult<ClientAdapter> {
        let convertor = self.store.key_convertor();
        let key = match id {
            Some(raw) => convertor.decode(raw).map_err(CoreError::from)?,
            None => convertor.new_key(),
        };
        let business_key = match client_id {
            Some(c) => c.to_owned(),
            None => convertor.encode(&key),
        };
        trace!(realm = realm_id, client = %business_key, "add client");

        if self.get_by_client_id(realm_id, &business_key)?.is_some() {
            return Err(ModelError::DuplicateClient {
                client_id: business_key,
            });
        }

        let entity = ClientEntity::new(key, realm_id, business_key.clone());
        let handle = match self.tx.create(entity) {
            Ok(handle) => handle,
            Err(CoreError::Storage(StorageError::DuplicateKey { .. })) => {
                return Err(ModelError::DuplicateClient {
                    client_id: business_key,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let adapter = self.adapter(handle);
        self.events.publish(&StoreEvent::Created(adapter.snapshot()));
        adapter.update_client();
        Ok(adapter)
    }

    /// Looks up a client by its external id within the realm.
    ///
    /// A malformed id is an ordinary miss, not an error.
    pub fn get_by_id(&self, realm_id: &str, id: &str) -> ModelResult<Option<ClientAdapter>> {
        Ok(self
            .handle_in_realm(realm_id, id)?
            .map(|handle| self.adapter(handle)))
    }

    /// Looks up a client by its business key, case-insensitively.
    pub fn get_by_client_id(
        &self,
        realm_id: &str,
        client_id: &str,
    ) -> ModelResult<Option<ClientAdapter>> {
        let criteria = Self::realm_criteria(realm_id)?.compare(
            ClientField::ClientId,
            Operator::Ilike,
            client_id,
        )?;
        let mut handles = self.tx.read_by(&QueryParams::with_criteria(criteria))?;
        Ok((!handles.is_empty()).then(|| self.adapter(handles.remove(0))))
    }

    /// The realm's clients ordered by business key, paginated.
    pub fn clients(
        &self,
        realm_id: &str,
        first: Option<usize>,
        max: Option<usize>,
    ) -> ModelResult<Vec<ClientAdapter>> {
        let params = QueryParams::with_criteria(Self::realm_criteria(realm_id)?)
            .order_by(ClientField::ClientId, Order::Ascending)
            .pagination(first, max);
        let handles = self.tx.read_by(&params)?;
        Ok(handles.into_iter().map(|h| self.adapter(h)).collect())
    }

    /// Clients whose business key contains `search`, case-insensitively,
    /// ordered by business key.
    pub fn search_by_client_id(
        &self,
        realm_id: &str,
        search: &str,
        first: Option<usize>,
        max: Option<usize>,
    ) -> ModelResult<Vec<ClientAdapter>> {
        let pattern = format!("%{search}%");
        let criteria =
            Self::realm_criteria(realm_id)?.compare(ClientField::ClientId, Operator::Ilike, pattern)?;
        let params = QueryParams::with_criteria(criteria)
            .order_by(ClientField::ClientId, Order::Ascending)
            .pagination(first, max);
        let handles = self.tx.read_by(&params)?;
        Ok(handles.into_iter().map(|h| self.adapter(h)).collect())
    }

    /// Number of clients in the realm, as seen by this transaction.
    pub fn count(&self, realm_id: &str) -> ModelResult<usize> {
        let params = QueryParams::with_criteria(Self::realm_criteria(realm_id)?);
        Ok(self.tx.read_by(&params)?.len())
    }

    /// Removes a client and everything hanging off it.
    ///
    /// Order matters: the cascade strips roles and scope mappings and
    /// consults dependents first, the `Removed` event goes out while
    /// the entity is still readable, and only then is the entity
    /// deleted and its node registrations dropped. Returns false when
    /// the realm has no such client.
    pub fn remove(&self, realm_id: &str, id: &str) -> ModelResult<bool> {
        let Some(handle) = self.handle_in_realm(realm_id, id)? else {
            return Ok(false);
        };
        let doomed = handle.snapshot();
        trace!(realm = realm_id, client = %doomed.client_id, "remove client");

        self.cascade.run(self, realm_id, &doomed)?;
        self.events.publish(&StoreEvent::Removed(doomed.clone()));
        self.tx.delete(&doomed.id)?;
        self.nodes.forget_client(doomed.id);
        Ok(true)
    }

    /// Removes every client in the realm. Returns how many went.
    ///
    /// The candidate ids are collected before the first removal so the
    /// per-client cascades cannot disturb the iteration.
    pub fn remove_all(&self, realm_id: &str) -> ModelResult<usize> {
        let ids: Vec<String> = self
            .clients(realm_id, None, None)?
            .iter()
            .map(|c| c.id().to_owned())
            .collect();
        for id in &ids {
            self.remove(realm_id, id)?;
        }
        Ok(ids.len())
    }

    /// Attaches scopes to a client, skipping scopes of a different
    /// protocol and scopes already attached. Returns the ids actually
    /// attached.
    pub fn add_client_scopes(
        &self,
        realm_id: &str,
        id: &str,
        scopes: &[ClientScope],
        default_scope: bool,
    ) -> ModelResult<Vec<Uuid>> {
        let Some(handle) = self.handle_in_realm(realm_id, id)? else {
            return Ok(Vec::new());
        };
        let protocol = handle.with(|c| c.protocol);
        let mut attached = Vec::new();
        for scope in scopes.iter().filter(|s| s.protocol == protocol) {
            if handle.update(|c| c.add_client_scope(scope.id, default_scope))? {
                attached.push(scope.id);
            }
        }
        Ok(attached)
    }

    /// Detaches a scope from a client. Returns false when nothing was
    /// attached.
    pub fn remove_client_scope(
        &self,
        realm_id: &str,
        id: &str,
        scope_id: &Uuid,
    ) -> ModelResult<bool> {
        let Some(handle) = self.handle_in_realm(realm_id, id)? else {
            return Ok(false);
        };
        Ok(handle.update(|c| c.remove_client_scope(scope_id))?)
    }

    /// The scope ids attached to a client with the given default flag.
    pub fn client_scope_ids(
        &self,
        realm_id: &str,
        id: &str,
        default_scope: bool,
    ) -> ModelResult<Vec<Uuid>> {
        let Some(handle) = self.handle_in_realm(realm_id, id)? else {
            return Ok(Vec::new());
        };
        Ok(handle.with(|c| c.client_scope_ids(default_scope)))
    }

    /// Strips a doomed role from every client in the realm that grants
    /// it through a scope mapping. Returns how many clients changed.
    pub fn pre_remove_role(&self, realm_id: &str, role_id: &Uuid) -> ModelResult<usize> {
        let criteria = Self::realm_criteria(realm_id)?.compare(
            ClientField::ScopeMappingRole,
            Operator::Eq,
            *role_id,
        )?;
        let handles = self.tx.read_by(&QueryParams::with_criteria(criteria))?;
        trace!(realm = realm_id, clients = handles.len(), "pre_remove_role");
        for handle in &handles {
            handle.update(|c| {
                c.delete_scope_mapping(role_id);
            })?;
        }
        Ok(handles.len())
    }

    /// Redirect URIs of every enabled client in the realm, keyed by
    /// business key. Clients without redirect URIs are omitted.
    pub fn redirect_uris_of_enabled_clients(
        &self,
        realm_id: &str,
    ) -> ModelResult<HashMap<String, BTreeSet<String>>> {
        let criteria =
            Self::realm_criteria(realm_id)?.compare(ClientField::Enabled, Operator::Eq, true)?;
        let handles = self.tx.read_by(&QueryParams::with_criteria(criteria))?;
        Ok(handles
            .iter()
            .map(|h| h.with(|c| (c.client_id.clone(), c.redirect_uris.clone())))
            .filter(|(_, uris)| !uris.is_empty())
            .collect())
    }

    /// The cascade this provider runs before deletes.
    #[must_use]
    pub fn cascade(&self) -> &RemovalCascade {
        &self.cascade
    }

    /// Commits the buffered changes atomically.
    ///
    /// Role deletions performed by removal cascades live in the role
    /// provider's transaction and are committed through it.
    pub fn commit(self) -> ModelResult<()> {
        Ok(self.tx.commit()?)
    }

    /// Discards all buffered changes.
    pub fn rollback(self) {
        self.tx.rollback();
    }
}

impl std::fmt::Debug for ClientProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientProvider")
            .field("cascade", &self.cascade)
            .finish()
    }
}
