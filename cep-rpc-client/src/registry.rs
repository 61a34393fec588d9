use crate::proxy::RemoteObject;
use cep_rpc_core::{RemoteHandle, Uid};
use dashmap::DashMap;

/// Maps remote uids to the one proxy that stands for each of them.
///
/// Entries are never evicted: the remote side gives no signal when an
/// object dies, so the table lives as long as the communicator.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    proxies: DashMap<Uid, RemoteObject>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        ProxyRegistry {
            proxies: DashMap::new(),
        }
    }

    /// Returns the proxy registered for `handle`'s uid, building and
    /// registering one with `make` if there is none yet. An existing proxy
    /// is returned unchanged.
    pub fn get_or_create<F>(&self, handle: RemoteHandle, make: F) -> RemoteObject
    where
        F: FnOnce(RemoteHandle) -> RemoteObject,
    {
        self.proxies
            .entry(handle.uid())
            .or_insert_with(|| make(handle))
            .value()
            .clone()
    }

    pub fn lookup(&self, uid: Uid) -> Option<RemoteObject> {
        self.proxies.get(&uid).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
