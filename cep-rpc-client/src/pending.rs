use cep_rpc_core::CallId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Decoded results waiting for the caller that issued the request.
///
/// Each entry is handed out once. Ids whose caller gave up are remembered
/// so a late response is dropped instead of sitting in the table forever.
#[derive(Debug, Default)]
pub struct PendingResults {
    inner: Mutex<PendingInner>,
}

#[derive(Debug, Default)]
struct PendingInner {
    results: HashMap<CallId, Value>,
    abandoned: HashSet<CallId>,
}

impl PendingResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the result for `id`. Returns false if it was dropped because
    /// the caller already timed out.
    pub fn insert(&self, id: CallId, result: Value) -> bool {
        let mut inner = self.inner.lock();
        if inner.abandoned.remove(&id) {
            tracing::debug!(%id, "Dropping late response for abandoned call");
            return false;
        }
        if inner.results.insert(id, result).is_some() {
            tracing::warn!(%id, "Duplicate response replaced an unclaimed result");
        }
        true
    }

    pub fn take(&self, id: CallId) -> Option<Value> {
        self.inner.lock().results.remove(&id)
    }

    /// Gives up on `id`: any stored result is discarded and a future one
    /// will be ignored.
    pub fn abandon(&self, id: CallId) {
        let mut inner = self.inner.lock();
        if inner.results.remove(&id).is_none() {
            inner.abandoned.insert(id);
        }
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.inner.lock().results.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().results.is_empty()
    }

    pub fn abandoned_len(&self) -> usize {
        self.inner.lock().abandoned.len()
    }
}
