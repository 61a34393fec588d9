use crate::bridge::{Bridge, BridgeError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// One bridge per connection identifier.
///
/// A process that starts several engines against the same panel reuses the
/// bridge created first instead of opening a second connection.
#[derive(Debug, Default)]
pub struct BridgeArena {
    bridges: DashMap<String, Bridge>,
}

impl BridgeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bridge for `identifier`, calling `connect` only when
    /// there is none yet. A failed connect leaves the arena unchanged.
    /// Concurrent callers for the same identifier block until the first
    /// connect returns, and `connect` must not call back into the arena.
    pub fn get_or_create<F>(&self, identifier: &str, connect: F) -> Result<Bridge, BridgeError>
    where
        F: FnOnce(&str) -> Result<Bridge, BridgeError>,
    {
        match self.bridges.entry(identifier.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!(identifier, "Reusing bridge");
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let bridge = connect(identifier)?;
                entry.insert(bridge.clone());
                Ok(bridge)
            }
        }
    }

    pub fn lookup(&self, identifier: &str) -> Option<Bridge> {
        self.bridges.get(identifier).map(|entry| entry.clone())
    }

    pub fn remove(&self, identifier: &str) -> Option<Bridge> {
        self.bridges.remove(identifier).map(|(_, bridge)| bridge)
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.bridges.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn clear(&self) {
        self.bridges.clear();
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}
