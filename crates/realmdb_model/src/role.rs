//! Roles contained in clients, and the provider that manages them.
//!
//! Only the slice of the role model the client lifecycle needs lives
//! here: client-level roles are owned by a client and must disappear
//! with it, and any role can be referenced by other clients through
//! scope mappings.

use std::sync::Arc;

use realmdb_core::{EntityStore, EventBus, StoreEvent, Transaction};
use realmdb_storage::{
    Criteria, FieldKind, FieldValue, Operator, QueryParams, Searchable, StoreEntity,
};
use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::error::ModelResult;

/// The stored state of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntity {
    /// Opaque store key.
    pub id: Uuid,
    /// Owning realm.
    pub realm_id: String,
    /// Role name, unique within its container.
    pub name: String,
    /// The containing client, or `None` for a realm-level role.
    pub client_id: Option<Uuid>,
}

impl StoreEntity for RoleEntity {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }
}

/// Searchable fields of [`RoleEntity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleField {
    /// Owning realm.
    RealmId,
    /// Role name.
    Name,
    /// Containing client key, absent for realm-level roles.
    ClientId,
}

impl Searchable for RoleEntity {
    type Field = RoleField;

    fn field_kind(field: RoleField) -> FieldKind {
        match field {
            RoleField::RealmId | RoleField::Name | RoleField::ClientId => FieldKind::Text,
        }
    }

    fn field_values(&self, field: RoleField) -> Vec<FieldValue> {
        match field {
            RoleField::RealmId => vec![FieldValue::Text(self.realm_id.clone())],
            RoleField::Name => vec![FieldValue::Text(self.name.clone())],
            // Realm-level roles hold no value here, so a ClientId
            // criterion simply never matches them.
            RoleField::ClientId => self.client_id.map(FieldValue::from).into_iter().collect(),
        }
    }
}

/// Per-request role provider.
///
/// Shares the request-scoped pattern of `ClientProvider`: one
/// transaction begun at construction, terminated exactly once by
/// [`RoleProvider::commit`] or [`RoleProvider::rollback`].
pub struct RoleProvider {
    store: EntityStore<RoleEntity>,
    tx: Transaction<RoleEntity>,
    events: Arc<EventBus<RoleEntity>>,
}

impl RoleProvider {
    /// Opens a provider with a fresh transaction on the role store.
    #[must_use]
    pub fn new(store: EntityStore<RoleEntity>, events: Arc<EventBus<RoleEntity>>) -> Self {
        let tx = store.begin();
        Self { store, tx, events }
    }

    /// Creates a client-level role and returns its key.
    pub fn add_client_role(
        &self,
        realm_id: &str,
        client_key: Uuid,
        name: &str,
    ) -> ModelResult<Uuid> {
        let id = self.store.key_convertor().new_key();
        trace!(realm = realm_id, role = name, "add_client_role");
        let role = RoleEntity {
            id,
            realm_id: realm_id.to_owned(),
            name: name.to_owned(),
            client_id: Some(client_key),
        };
        let handle = self.tx.create(role)?;
        self.events.publish(&StoreEvent::Created(handle.snapshot()));
        Ok(id)
    }

    /// Reads a role by key, honoring the realm boundary.
    pub fn get_role(&self, realm_id: &str, id: &Uuid) -> ModelResult<Option<RoleEntity>> {
        let Some(handle) = self.tx.read(id)? else {
            return Ok(None);
        };
        let role = handle.snapshot();
        Ok((role.realm_id == realm_id).then_some(role))
    }

    /// Snapshots of the roles contained in a client, in key order.
    pub fn roles_of_client(&self, realm_id: &str, client_key: Uuid) -> ModelResult<Vec<RoleEntity>> {
        let criteria = Criteria::new()
            .compare(RoleField::RealmId, Operator::Eq, realm_id)?
            .compare(RoleField::ClientId, Operator::Eq, client_key)?;
        let handles = self.tx.read_by(&QueryParams::with_criteria(criteria))?;
        Ok(handles.iter().map(|h| h.snapshot()).collect())
    }

    /// Deletes every role contained in a client. Returns how many went.
    ///
    /// The candidate set is snapshotted before the first delete so the
    /// iteration never observes its own removals.
    pub fn remove_roles_of_client(&self, realm_id: &str, client_key: Uuid) -> ModelResult<usize> {
        let roles = self.roles_of_client(realm_id, client_key)?;
        trace!(
            realm = realm_id,
            count = roles.len(),
            "remove_roles_of_client"
        );
        for role in &roles {
            self.events.publish(&StoreEvent::Removed(role.clone()));
            self.tx.delete(&role.id)?;
        }
        Ok(roles.len())
    }

    /// Commits the underlying transaction.
    pub fn commit(self) -> ModelResult<()> {
        Ok(self.tx.commit()?)
    }

    /// Discards all buffered changes.
    pub fn rollback(self) {
        self.tx.rollback();
    }
}
