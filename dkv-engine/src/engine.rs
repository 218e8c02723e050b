//! # Engine Trait
//!
//! Strategy seam between the server and the storage backend. The server only
//! talks to `KVEngine`, so a lock-free table could replace the sharded map
//! without touching request handling.

use bytes::Bytes;

use dkv_common::DkvResult;

/// Upper bound on the up-front allocation made by `sample`.
const SAMPLE_PREALLOC_MAX: i64 = 1024;

/// Concurrent key/value backend.
///
/// Implementations provide their own synchronization: every method takes
/// `&self` and may be called from any number of threads at once.
pub trait KVEngine: Send + Sync {
    /// Returns the value for `key`, or `None` when no write has completed.
    ///
    /// Any string is a valid key, including the empty one.
    fn get(&self, key: &str) -> DkvResult<Option<Bytes>>;

    /// Inserts or replaces the value for `key`.
    ///
    /// The write is visible to every `get` issued after this returns.
    fn put(&self, key: String, value: Bytes) -> DkvResult<()>;

    /// Number of entries currently stored.
    fn len(&self) -> usize;

    /// Returns true when the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits up to `limit` keys; `limit <= 0` visits every key.
    ///
    /// Traversal is weakly consistent: keys written during the walk may or may
    /// not be seen. Returning `false` from `visit` stops the walk early. The
    /// visitor must not write to the same engine.
    fn for_each_key(&self, limit: i64, visit: &mut dyn FnMut(&str) -> bool);

    /// Collects up to `limit` keys; `limit <= 0` returns every key.
    fn sample(&self, limit: i64) -> Vec<String> {
        let mut keys = Vec::with_capacity(limit.clamp(0, SAMPLE_PREALLOC_MAX) as usize);
        self.for_each_key(limit, &mut |key| {
            keys.push(key.to_string());
            true
        });
        keys
    }
}
