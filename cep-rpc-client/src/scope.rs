use crate::proxy::RemoteValue;
use cep_rpc_core::RpcError;
use indexmap::IndexMap;

/// The remote runtime's top-level bindings, fetched once at connect time.
#[derive(Debug, Clone, Default)]
pub struct ProxyScope {
    bindings: IndexMap<String, RemoteValue>,
}

impl ProxyScope {
    pub fn new(bindings: IndexMap<String, RemoteValue>) -> Self {
        ProxyScope { bindings }
    }

    pub fn get(&self, name: &str) -> Result<&RemoteValue, RpcError> {
        self.bindings
            .get(name)
            .ok_or_else(|| RpcError::no_such_attribute(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Binding names in the order the remote side listed them.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RemoteValue)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
