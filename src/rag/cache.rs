//! Process-wide memoization of service clients.
//!
//! HTTP clients hold connection pools and are expensive to build, so the
//! embedder and reranker are constructed once per credential set and shared.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// Identity of a service client: credentials plus the model it talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ClientKey {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }
}

/// Lazily-populated map from a key (by default a [`ClientKey`]) to a shared
/// client. Callers extend the key with any setting baked into the client.
pub struct ClientCache<T, K = ClientKey> {
    entries: Mutex<HashMap<K, Arc<T>>>,
}

impl<T, K> Default for ClientCache<T, K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T, K: Eq + Hash + Clone> ClientCache<T, K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client for `key`, building it with `init` on first use.
    ///
    /// A failed build is not cached; the next call tries again.
    pub fn get_or_try_init<E>(
        &self,
        key: &K,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.get(key) {
            return Ok(Arc::clone(existing));
        }

        let client = Arc::new(init()?);
        entries.insert(key.clone(), Arc::clone(&client));
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
