//! In-process registry backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::registry::{
    Registry, RegistryError, ServiceInstance, Subscription, instance_key, service_key,
};

/// An in-process [`Registry`].
///
/// Instances are stored exactly the way an etcd backend stores them — one
/// entry per instance under `/micro/<name>/<address>`, the value a
/// JSON-encoded [`ServiceInstance`], listed by prefix scan — so everything
/// built on top of the abstraction exercises the same key and value
/// contract.
///
/// Every handle carries its own session, the way each etcd registry client
/// owns its own lease session. [`handle`](MemoryRegistry::handle) opens a
/// new session over the same store; cloning shares the session.
/// [`close`](Registry::close) expires only the calling session: its
/// registrations are withdrawn and further operations through it are
/// rejected, while other sessions' entries and handles stay untouched.
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    store: Arc<Mutex<Store>>,
    session: u64,
}

#[derive(Debug)]
struct Entry {
    /// JSON-encoded instance.
    value: String,
    /// Service name, kept for change notification on expiry.
    service: String,
    /// Session that registered this entry.
    session: u64,
}

#[derive(Debug, Default)]
struct Store {
    /// key -> entry, ordered so prefix scans work.
    entries: BTreeMap<String, Entry>,
    /// Per-service change notifiers.
    notifiers: HashMap<String, watch::Sender<u64>>,
    /// Sessions whose handles have been closed.
    closed: HashSet<u64>,
    next_session: u64,
}

impl Store {
    fn notify(&mut self, service: &str) {
        if let Some(tx) = self.notifiers.get(service) {
            tx.send_modify(|v| *v += 1);
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Create an empty registry with its first session.
    pub fn new() -> MemoryRegistry {
        MemoryRegistry {
            store: Arc::new(Mutex::new(Store {
                next_session: 1,
                ..Store::default()
            })),
            session: 0,
        }
    }

    /// Open a new session over the same store.
    ///
    /// Each server gets its own handle, so closing one expires only that
    /// server's registrations.
    pub fn handle(&self) -> MemoryRegistry {
        let mut store = self.store();
        let session = store.next_session;
        store.next_session += 1;
        MemoryRegistry {
            store: Arc::clone(&self.store),
            session,
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self) -> Result<MutexGuard<'_, Store>, RegistryError> {
        let store = self.store();
        if store.closed.contains(&self.session) {
            return Err(RegistryError::Closed);
        }
        Ok(store)
    }
}

impl Registry for MemoryRegistry {
    async fn register(&self, instance: ServiceInstance) -> Result<(), RegistryError> {
        let value = serde_json::to_string(&instance)
            .map_err(|e| RegistryError::Codec(e.to_string()))?;
        let mut store = self.open()?;
        store.entries.insert(
            instance_key(&instance),
            Entry {
                value,
                service: instance.name.clone(),
                session: self.session,
            },
        );
        store.notify(&instance.name);
        Ok(())
    }

    async fn unregister(&self, instance: ServiceInstance) -> Result<(), RegistryError> {
        let mut store = self.open()?;
        store.entries.remove(&instance_key(&instance));
        store.notify(&instance.name);
        Ok(())
    }

    async fn list_services(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let store = self.open()?;
        let prefix = format!("{}/", service_key(service));
        store
            .entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(_, entry)| {
                serde_json::from_str(&entry.value).map_err(|e| RegistryError::Codec(e.to_string()))
            })
            .collect()
    }

    fn subscribe(&self, service: &str) -> Result<Subscription, RegistryError> {
        let mut store = self.open()?;
        let tx = store
            .notifiers
            .entry(service.to_string())
            .or_insert_with(|| watch::channel(0).0);
        Ok(Subscription::from_watch(tx.subscribe()))
    }

    async fn close(&self) -> Result<(), RegistryError> {
        let mut store = self.store();
        if !store.closed.insert(self.session) {
            return Ok(());
        }
        // Expire this session's registrations, the way a lease-backed
        // backend drops a closed session's keys, and wake the services
        // that lost an instance.
        let mut expired = HashSet::new();
        store.entries.retain(|_, entry| {
            if entry.session == self.session {
                expired.insert(entry.service.clone());
                false
            } else {
                true
            }
        });
        for service in expired {
            store.notify(&service);
        }
        Ok(())
    }
}
