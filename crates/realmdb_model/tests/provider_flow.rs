//! End-to-end flows through the client provider: request-scoped
//! transactions, the removal cascade, events, and the node side table.

use std::rc::Rc;
use std::sync::Arc;

use parking_lot::Mutex;
use realmdb_core::{EntityStore, EventBus, StoreEvent};
use realmdb_model::{
    ClientDependent, ClientEntity, ClientProvider, ClientScope, ModelError, ModelResult, Protocol,
    RegisteredNodes, RemovalCascade, RoleEntity, RoleProvider,
};
use realmdb_storage::{FileBackend, MemoryBackend, UuidConvertor};
use uuid::Uuid;

struct Harness {
    clients: EntityStore<ClientEntity>,
    roles: EntityStore<RoleEntity>,
    events: Arc<EventBus<ClientEntity>>,
    nodes: RegisteredNodes,
}

impl Harness {
    fn in_memory() -> Self {
        Self {
            clients: EntityStore::new(Arc::new(MemoryBackend::new()), Arc::new(UuidConvertor)),
            roles: EntityStore::new(Arc::new(MemoryBackend::new()), Arc::new(UuidConvertor)),
            events: Arc::new(EventBus::new()),
            nodes: RegisteredNodes::new(),
        }
    }

    /// One "request": a client provider plus the role provider its
    /// cascade cleans up through.
    fn request(&self) -> (ClientProvider, Rc<RoleProvider>) {
        self.request_with(Vec::new())
    }

    fn request_with(
        &self,
        dependents: Vec<Rc<dyn ClientDependent>>,
    ) -> (ClientProvider, Rc<RoleProvider>) {
        let roles = Rc::new(RoleProvider::new(
            self.roles.clone(),
            Arc::new(EventBus::new()),
        ));
        let mut cascade = RemovalCascade::new(Rc::clone(&roles));
        for dependent in dependents {
            cascade = cascade.with_dependent(dependent);
        }
        let provider = ClientProvider::new(
            self.clients.clone(),
            Arc::clone(&self.events),
            self.nodes.clone(),
            cascade,
        );
        (provider, roles)
    }
}

/// Commits both providers of a request; the client provider goes first
/// so its cascade's role deletions land with it.
fn commit_request(provider: ClientProvider, roles: Rc<RoleProvider>) {
    provider.commit().unwrap();
    Rc::try_unwrap(roles)
        .ok()
        .expect("role provider still shared")
        .commit()
        .unwrap();
}

#[test]
fn lifecycle_spans_requests() {
    let h = Harness::in_memory();

    let id = {
        let (p, r) = h.request();
        let c = p.add("master", None, Some("account-console")).unwrap();
        c.add_redirect_uri("https://example.test/cb").unwrap();
        let id = c.id().to_owned();
        drop(c);
        commit_request(p, r);
        id
    };

    let (p, _r) = h.request();
    let c = p.get_by_id("master", &id).unwrap().expect("committed client");
    assert_eq!(c.client_id(), "account-console");
    assert!(c.redirect_uris().contains("https://example.test/cb"));

    // Identity is stable within a request.
    let again = p.get_by_client_id("master", "account-console").unwrap().unwrap();
    assert!(c.same_client(&again));
}

#[test]
fn tracked_mutations_need_no_explicit_save() {
    let h = Harness::in_memory();
    let (p, r) = h.request();
    let c = p.add("master", None, Some("console")).unwrap();
    let id = c.id().to_owned();
    drop(c);
    commit_request(p, r);

    {
        let (p, r) = h.request();
        let c = p.get_by_id("master", &id).unwrap().unwrap();
        c.set_enabled(false).unwrap();
        c.add_redirect_uri("https://example.test/cb").unwrap();
        drop(c);
        commit_request(p, r);
    }

    let (p, _r) = h.request();
    let c = p.get_by_id("master", &id).unwrap().unwrap();
    assert!(!c.is_enabled());
    assert_eq!(c.redirect_uris().len(), 1);
}

#[test]
fn realms_are_isolated() {
    let h = Harness::in_memory();
    let (p, r) = h.request();
    let a = p.add("master", None, Some("console")).unwrap();
    let id = a.id().to_owned();
    drop(a);
    commit_request(p, r);

    let (p, _r) = h.request();
    assert!(p.get_by_id("tenant-b", &id).unwrap().is_none());
    assert!(p.get_by_client_id("tenant-b", "console").unwrap().is_none());
    assert_eq!(p.count("tenant-b").unwrap(), 0);
    assert_eq!(p.count("master").unwrap(), 1);
}

#[test]
fn removal_cascades_into_roles_and_foreign_scope_mappings() {
    let h = Harness::in_memory();
    let (p, r) = h.request();

    let doomed = p.add("master", None, Some("doomed")).unwrap();
    let bystander = p.add("master", None, Some("bystander")).unwrap();
    let role_id = r
        .add_client_role("master", doomed.key(), "doomed-role")
        .unwrap();
    bystander.add_scope_mapping(role_id).unwrap();

    assert!(p.remove("master", &doomed.id().to_owned()).unwrap());

    // The bystander lost the mapping but nothing else.
    assert!(bystander.scope_mapping_roles().is_empty());
    assert_eq!(p.count("master").unwrap(), 1);
    assert!(r.roles_of_client("master", doomed.key()).unwrap().is_empty());

    drop(doomed);
    drop(bystander);
    commit_request(p, r);

    let (p, r) = h.request();
    assert!(p.get_by_client_id("master", "doomed").unwrap().is_none());
    assert!(p.get_by_client_id("master", "bystander").unwrap().is_some());
    drop(r);
}

struct Veto;

impl ClientDependent for Veto {
    fn pre_remove(&self, _realm_id: &str, _client: &ClientEntity) -> ModelResult<()> {
        Err(ModelError::CascadeAborted {
            step: "user consents",
        })
    }
}

#[test]
fn dependent_veto_aborts_the_removal() {
    let h = Harness::in_memory();
    let (p, r) = h.request_with(vec![Rc::new(Veto)]);
    let c = p.add("master", None, Some("protected")).unwrap();
    let id = c.id().to_owned();
    drop(c);

    let err = p.remove("master", &id).unwrap_err();
    assert!(matches!(err, ModelError::CascadeAborted { .. }));
    // The client is still there, in this and the next request.
    assert!(p.get_by_id("master", &id).unwrap().is_some());
    commit_request(p, r);

    let (p, _r) = h.request();
    assert!(p.get_by_id("master", &id).unwrap().is_some());
}

#[test]
fn events_flow_created_updated_removed() {
    let h = Harness::in_memory();
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    h.events.subscribe(move |event| {
        let kind = match event {
            StoreEvent::Created(c) => format!("created:{}", c.client_id),
            StoreEvent::Updated(c) => format!("updated:{}", c.client_id),
            StoreEvent::Removed(c) => format!("removed:{}", c.client_id),
        };
        sink.lock().push(kind);
        Ok(())
    });

    let (p, r) = h.request();
    let c = p.add("master", None, Some("console")).unwrap();
    c.set_enabled(false).unwrap();
    c.update_client();
    let id = c.id().to_owned();
    drop(c);
    p.remove("master", &id).unwrap();
    commit_request(p, r);

    assert_eq!(
        *log.lock(),
        [
            "created:console",
            "updated:console",
            "updated:console",
            "removed:console",
        ]
    );
}

#[test]
fn removed_event_fires_before_physical_delete() {
    let h = Harness::in_memory();
    let (p, r) = h.request();
    let c = p.add("master", None, Some("console")).unwrap();
    let key = c.key();
    let id = c.id().to_owned();
    drop(c);
    commit_request(p, r);

    // At delivery time the entity must still be durably present, so a
    // subscriber can clean up its own references to it.
    let observed: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);
    let store = h.clients.clone();
    h.events.subscribe(move |event| {
        if let StoreEvent::Removed(client) = event {
            let present = store.read(&client.id).unwrap().is_some();
            *sink.lock() = Some(present);
        }
        Ok(())
    });

    let (p, r) = h.request();
    assert!(p.remove("master", &id).unwrap());
    commit_request(p, r);

    assert_eq!(*observed.lock(), Some(true));
    assert!(h.clients.read(&key).unwrap().is_none());
}

#[test]
fn failing_subscriber_does_not_block_the_operation() {
    let h = Harness::in_memory();
    h.events.subscribe(|_| Err("subscriber down".into()));

    let (p, r) = h.request();
    let c = p.add("master", None, Some("console")).unwrap();
    drop(c);
    commit_request(p, r);

    let (p, _r) = h.request();
    assert!(p.get_by_client_id("master", "console").unwrap().is_some());
}

#[test]
fn scope_attachment_respects_protocol_across_requests() {
    let h = Harness::in_memory();
    let scope = ClientScope {
        id: Uuid::new_v4(),
        name: "profile".into(),
        protocol: Protocol::OpenidConnect,
    };

    let id = {
        let (p, r) = h.request();
        let c = p.add("master", None, Some("console")).unwrap();
        let id = c.id().to_owned();
        drop(c);
        commit_request(p, r);
        id
    };

    let (p, r) = h.request();
    let attached = p
        .add_client_scopes("master", &id, std::slice::from_ref(&scope), true)
        .unwrap();
    assert_eq!(attached, vec![scope.id]);
    commit_request(p, r);

    let (p, _r) = h.request();
    assert_eq!(p.client_scope_ids("master", &id, true).unwrap(), vec![scope.id]);
}

#[test]
fn node_registrations_bypass_the_transaction() {
    let h = Harness::in_memory();
    let (p, r) = h.request();
    let c = p.add("master", None, Some("console")).unwrap();
    let key = c.key();
    c.register_node("node-1", 100);
    c.register_node("node-1", 250);
    drop(c);

    // Visible outside the request before any commit.
    assert_eq!(h.nodes.nodes_of(key).get("node-1"), Some(&250));

    // Rolling back the transaction does not undo registrations.
    drop(r);
    p.rollback();
    assert_eq!(h.nodes.nodes_of(key).get("node-1"), Some(&250));
}

#[test]
fn removal_drops_node_registrations() {
    let h = Harness::in_memory();
    let (p, r) = h.request();
    let c = p.add("master", None, Some("console")).unwrap();
    let key = c.key();
    let id = c.id().to_owned();
    c.register_node("node-1", 100);
    drop(c);

    assert!(p.remove("master", &id).unwrap());
    assert!(h.nodes.nodes_of(key).is_empty());
    commit_request(p, r);
}

#[test]
fn file_backend_persists_clients_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clients.json");

    let id = {
        let backend: FileBackend<ClientEntity> = FileBackend::open(&path).unwrap();
        let h = Harness {
            clients: EntityStore::new(Arc::new(backend), Arc::new(UuidConvertor)),
            roles: EntityStore::new(Arc::new(MemoryBackend::new()), Arc::new(UuidConvertor)),
            events: Arc::new(EventBus::new()),
            nodes: RegisteredNodes::new(),
        };
        let (p, r) = h.request();
        let c = p.add("master", None, Some("console")).unwrap();
        let id = c.id().to_owned();
        drop(c);
        commit_request(p, r);
        id
    };

    let backend: FileBackend<ClientEntity> = FileBackend::open(&path).unwrap();
    let h = Harness {
        clients: EntityStore::new(Arc::new(backend), Arc::new(UuidConvertor)),
        roles: EntityStore::new(Arc::new(MemoryBackend::new()), Arc::new(UuidConvertor)),
        events: Arc::new(EventBus::new()),
        nodes: RegisteredNodes::new(),
    };
    let (p, _r) = h.request();
    let c = p.get_by_id("master", &id).unwrap().expect("persisted client");
    assert_eq!(c.client_id(), "console");
}
