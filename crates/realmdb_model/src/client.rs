//! Client entity: the stored representation of an application registered
//! within a realm.
//!
//! A client carries two identifiers. The store key is an opaque [`Uuid`]
//! assigned at creation and never changed; `client_id` is the business
//! key administrators and protocols use, unique per realm by convention.
//! Scope attachments are stored keyed by scope id so re-attaching the
//! same scope is a no-op, and scope-mapping roles are a plain id set.

use std::collections::{BTreeMap, BTreeSet};

use realmdb_storage::{FieldKind, FieldValue, Searchable, StoreEntity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authentication protocol a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// OpenID Connect.
    #[default]
    OpenidConnect,
    /// SAML 2.0.
    Saml,
}

impl Protocol {
    /// The protocol's wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::OpenidConnect => "openid-connect",
            Protocol::Saml => "saml",
        }
    }
}

/// A client scope as seen by the provider when attaching scopes.
///
/// Scopes themselves live outside this store; callers pass this value
/// shape so the provider can filter by protocol and dedup by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientScope {
    /// The scope's key.
    pub id: Uuid,
    /// Human-readable scope name.
    pub name: String,
    /// Protocol the scope applies to; mismatched scopes are skipped.
    pub protocol: Protocol,
}

/// The stored state of a realm client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEntity {
    /// Opaque store key, immutable after creation.
    pub id: Uuid,
    /// Owning realm; every provider operation filters on it.
    pub realm_id: String,
    /// Business key, unique within the realm.
    pub client_id: String,
    /// Disabled clients are excluded from login-flow lookups.
    pub enabled: bool,
    /// Whether the standard authorization-code flow is allowed.
    pub standard_flow_enabled: bool,
    /// Protocol the client speaks.
    pub protocol: Protocol,
    /// Valid post-login redirect targets.
    pub redirect_uris: BTreeSet<String>,
    /// Attached scopes: scope id to default-scope flag.
    pub client_scopes: BTreeMap<Uuid, bool>,
    /// Role ids granted to this client via scope mappings.
    pub scope_mapping_roles: BTreeSet<Uuid>,
}

impl ClientEntity {
    /// Creates a client with the defaults a fresh registration gets:
    /// enabled, standard flow, OpenID Connect, no scopes or mappings.
    #[must_use]
    pub fn new(id: Uuid, realm_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            id,
            realm_id: realm_id.into(),
            client_id: client_id.into(),
            enabled: true,
            standard_flow_enabled: true,
            protocol: Protocol::default(),
            redirect_uris: BTreeSet::new(),
            client_scopes: BTreeMap::new(),
            scope_mapping_roles: BTreeSet::new(),
        }
    }

    /// Attaches a scope. Returns false when the scope is already
    /// attached; the existing default flag is left untouched.
    pub fn add_client_scope(&mut self, scope_id: Uuid, default_scope: bool) -> bool {
        if self.client_scopes.contains_key(&scope_id) {
            return false;
        }
        self.client_scopes.insert(scope_id, default_scope);
        true
    }

    /// Detaches a scope. Returns false when it was not attached.
    pub fn remove_client_scope(&mut self, scope_id: &Uuid) -> bool {
        self.client_scopes.remove(scope_id).is_some()
    }

    /// The attached scope ids with the given default flag, in id order.
    #[must_use]
    pub fn client_scope_ids(&self, default_scope: bool) -> Vec<Uuid> {
        self.client_scopes
            .iter()
            .filter(|(_, default)| **default == default_scope)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Grants a role through a scope mapping.
    pub fn add_scope_mapping(&mut self, role_id: Uuid) {
        self.scope_mapping_roles.insert(role_id);
    }

    /// Revokes a scope-mapping role. Returns false when absent.
    pub fn delete_scope_mapping(&mut self, role_id: &Uuid) -> bool {
        self.scope_mapping_roles.remove(role_id)
    }
}

impl StoreEntity for ClientEntity {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }
}

/// Searchable fields of [`ClientEntity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    /// Owning realm.
    RealmId,
    /// Business key.
    ClientId,
    /// Enabled flag.
    Enabled,
    /// Protocol wire name.
    Protocol,
    /// Membership in the scope-mapping role set.
    ScopeMappingRole,
}

impl Searchable for ClientEntity {
    type Field = ClientField;

    fn field_kind(field: ClientField) -> FieldKind {
        match field {
            ClientField::RealmId | ClientField::ClientId | ClientField::Protocol => FieldKind::Text,
            ClientField::Enabled => FieldKind::Boolean,
            ClientField::ScopeMappingRole => FieldKind::TextSet,
        }
    }

    fn field_values(&self, field: ClientField) -> Vec<FieldValue> {
        match field {
            ClientField::RealmId => vec![FieldValue::Text(self.realm_id.clone())],
            ClientField::ClientId => vec![FieldValue::Text(self.client_id.clone())],
            ClientField::Enabled => vec![FieldValue::Boolean(self.enabled)],
            ClientField::Protocol => vec![FieldValue::Text(self.protocol.as_str().to_owned())],
            ClientField::ScopeMappingRole => self
                .scope_mapping_roles
                .iter()
                .map(|id| FieldValue::from(*id))
                .collect(),
        }
    }
}
