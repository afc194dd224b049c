//! Cascade logic run before a client is physically deleted.
//!
//! Removing a client is not a single delete: roles contained in the
//! client must go, scope mappings pointing at those roles must be
//! stripped from every other client in the realm, and registered
//! dependents get a veto. Any failure aborts the whole removal, and
//! because every step runs inside the request's transactions, an
//! aborted cascade leaves no partial state behind.

use std::rc::Rc;

use tracing::trace;

use crate::client::ClientEntity;
use crate::error::ModelResult;
use crate::provider::ClientProvider;
use crate::role::RoleProvider;

/// A party holding references to clients that must release them before
/// a client disappears.
///
/// Returning an error vetoes the removal; the provider surfaces it and
/// performs no delete.
pub trait ClientDependent {
    /// Called with the doomed client's last state.
    fn pre_remove(&self, realm_id: &str, client: &ClientEntity) -> ModelResult<()>;
}

/// Ordered sequence of steps that precede a client delete.
pub struct RemovalCascade {
    roles: Rc<RoleProvider>,
    dependents: Vec<Rc<dyn ClientDependent>>,
}

impl RemovalCascade {
    /// Builds a cascade over the request's role provider.
    #[must_use]
    pub fn new(roles: Rc<RoleProvider>) -> Self {
        Self {
            roles,
            dependents: Vec::new(),
        }
    }

    /// Registers a dependent consulted on every removal, after the
    /// role cleanup steps.
    #[must_use]
    pub fn with_dependent(mut self, dependent: Rc<dyn ClientDependent>) -> Self {
        self.dependents.push(dependent);
        self
    }

    /// The role provider this cascade cleans up through.
    #[must_use]
    pub fn roles(&self) -> &RoleProvider {
        &self.roles
    }

    pub(crate) fn run(
        &self,
        clients: &ClientProvider,
        realm_id: &str,
        client: &ClientEntity,
    ) -> ModelResult<()> {
        trace!(realm = realm_id, client = %client.client_id, "removal cascade");

        // Every scope mapping in the realm that points at one of this
        // client's roles goes first, then the roles themselves.
        let roles = self.roles.roles_of_client(realm_id, client.id)?;
        for role in &roles {
            clients.pre_remove_role(realm_id, &role.id)?;
        }
        self.roles.remove_roles_of_client(realm_id, client.id)?;

        for dependent in &self.dependents {
            dependent.pre_remove(realm_id, client)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RemovalCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalCascade")
            .field("dependents", &self.dependents.len())
            .finish()
    }
}
