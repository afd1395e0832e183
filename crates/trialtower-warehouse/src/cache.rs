use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Query-result cache keyed by call arguments, storing each value with an
/// expiry instant. Expired entries are treated as absent; the only
/// invalidation beyond expiry is dropping everything at once.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries.get(key).and_then(|(value, expires_at)| {
            if Instant::now() < *expires_at {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key, (value, expires_at));
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}
