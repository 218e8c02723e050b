//! # In-Memory Engine
//!
//! Provide the in-memory backend with sharded locking so a bulk loader and
//! many readers can share one map without a global lock.
//!
//! ## Usage
//!
//! - Use `MemoryEngine::new()` for a default sharded engine sized from CPU
//!   parallelism.
//! - Use `MemoryEngine::with_shard_count_and_capacity` when the final entry
//!   count is known up front; each shard reserves its share to avoid rehashing
//!   during population.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: Per-shard `RwLock`s confine contention to one shard.
//! 2. **Shared Reads**: `get` takes a read lock, so readers never wait on each
//!    other, only on a writer of the same shard.
//! 3. **Whole-Value Swap**: Values are `Bytes` handles replaced in one map
//!    insert; a reader sees the old or the new buffer, never a mix.
//! 4. **Shard-at-a-Time Walks**: Enumeration holds one shard lock at a time.
//! 5. **Strategy Pattern**: Implements `KVEngine` to keep callers decoupled.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryEngine
//!   ├── shards: Vec<Shard>
//!   │     └── Shard
//!   │           └── inner: RwLock<ShardInner>
//!   │                 └── map: HashMap<Arc<str>, Bytes>
//!   ├── entries: AtomicUsize
//!   └── used_bytes: AtomicUsize
//! ```

use std::hash::{BuildHasher, Hasher};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ahash::RandomState;
use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::RwLock;

use dkv_common::DkvResult;

use crate::engine::KVEngine;

/// Default shards = CPU count * multiplier to reduce lock contention.
const DEFAULT_SHARD_MULTIPLIER: usize = 4;

/// Per-shard storage container.
///
/// The map key is `Arc<str>` so enumeration can hand out keys without copying
/// them while the shard lock is held.
#[derive(Debug)]
struct ShardInner {
    map: HashMap<Arc<str>, Bytes, RandomState>,
}

impl ShardInner {
    /// Creates a shard with room for `capacity` entries.
    ///
    /// Sharing the `RandomState` seed across shards keeps hash distribution
    /// consistent without introducing shared mutability.
    fn new(hash_state: RandomState, capacity: usize) -> Self {
        ShardInner {
            map: HashMap::with_capacity_and_hasher(capacity, hash_state),
        }
    }
}

/// Per-shard lock wrapper.
#[derive(Debug)]
struct Shard {
    inner: RwLock<ShardInner>,
}

/// Sharded in-memory implementation of `KVEngine`.
#[derive(Debug)]
pub struct MemoryEngine {
    /// Per-shard storage.
    shards: Vec<Shard>,
    /// Bitmask for fast shard selection (power-of-two shard count).
    shard_mask: usize,
    /// Hash state used to pick shards deterministically.
    hash_state: RandomState,
    /// Live entry count, updated on insert.
    entries: AtomicUsize,
    /// Key + value bytes held, updated on insert/replace.
    used_bytes: AtomicUsize,
}

impl MemoryEngine {
    /// Creates a new engine with a default shard count based on CPU parallelism.
    pub fn new() -> Self {
        Self::with_shard_count(default_shard_count())
    }

    /// Creates a new engine with a caller-provided shard count.
    ///
    /// The count is normalized to the next power of two to enable fast masking.
    pub fn with_shard_count(shards: usize) -> Self {
        Self::with_shard_count_and_capacity(shards, 0)
    }

    /// Creates a new engine and pre-sizes shards for `expected_entries`.
    ///
    /// A `shards` value of zero selects the CPU-based default.
    pub fn with_shard_count_and_capacity(shards: usize, expected_entries: usize) -> Self {
        let shards = if shards == 0 {
            default_shard_count()
        } else {
            shards
        };
        let shard_count = normalize_shard_count(shards);
        let per_shard = expected_entries.div_ceil(shard_count);
        let hash_state = RandomState::new();
        let mut shard_vec = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shard_vec.push(Shard {
                inner: RwLock::new(ShardInner::new(hash_state.clone(), per_shard)),
            });
        }

        MemoryEngine {
            shards: shard_vec,
            shard_mask: shard_count - 1,
            hash_state,
            entries: AtomicUsize::new(0),
            used_bytes: AtomicUsize::new(0),
        }
    }

    /// Number of shards backing this engine.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Key + value bytes currently held (allocator overhead excluded).
    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }

    /// Hashes a key to its owning shard index.
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key.as_bytes());
        (hasher.finish() as usize) & self.shard_mask
    }

    /// Returns the shard responsible for a given key.
    fn shard_for(&self, key: &str) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    fn entry_size(key_len: usize, value_len: usize) -> usize {
        key_len + value_len
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KVEngine for MemoryEngine {
    /// Looks up a key under the shard's read lock.
    fn get(&self, key: &str) -> DkvResult<Option<Bytes>> {
        let inner = self.shard_for(key).inner.read();
        Ok(inner.map.get(key).cloned())
    }

    /// Inserts or replaces a key/value pair.
    ///
    /// **Logic**:
    /// 1. Swap the value in under the shard write lock.
    /// 2. Adjust the global counters after the lock is released.
    fn put(&self, key: String, value: Bytes) -> DkvResult<()> {
        let key_len = key.len();
        let new_size = Self::entry_size(key_len, value.len());
        let shard = self.shard_for(&key);
        let key: Arc<str> = Arc::from(key);

        let previous = {
            let mut inner = shard.inner.write();
            inner.map.insert(key, value)
        };

        match previous {
            Some(old) => {
                let old_size = Self::entry_size(key_len, old.len());
                if new_size > old_size {
                    self.used_bytes
                        .fetch_add(new_size - old_size, Ordering::Relaxed);
                } else if old_size > new_size {
                    self.used_bytes
                        .fetch_sub(old_size - new_size, Ordering::Relaxed);
                }
            }
            None => {
                self.entries.fetch_add(1, Ordering::Relaxed);
                self.used_bytes.fetch_add(new_size, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    /// Walks shards in index order, holding one read lock at a time.
    ///
    /// Writers to a shard wait only while that shard is being walked.
    fn for_each_key(&self, limit: i64, visit: &mut dyn FnMut(&str) -> bool) {
        let mut remaining = if limit <= 0 {
            usize::MAX
        } else {
            usize::try_from(limit).unwrap_or(usize::MAX)
        };

        for shard in &self.shards {
            let inner = shard.inner.read();
            for key in inner.map.keys() {
                if remaining == 0 {
                    return;
                }
                if !visit(key.as_ref()) {
                    return;
                }
                remaining -= 1;
            }
        }
    }
}

fn default_shard_count() -> usize {
    let threads = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1);
    threads.saturating_mul(DEFAULT_SHARD_MULTIPLIER)
}

/// Normalizes shard counts to a power of two for fast masking.
fn normalize_shard_count(count: usize) -> usize {
    let count = count.max(1);
    count.next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn value(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    #[test]
    fn put_get_roundtrip() {
        let engine = MemoryEngine::with_shard_count(4);
        engine.put("alpha".to_string(), value(b"value")).unwrap();
        let found = engine.get("alpha").unwrap().unwrap();
        assert_eq!(&found[..], b"value");
    }

    #[test]
    fn missing_key_is_none() {
        let engine = MemoryEngine::with_shard_count(4);
        assert!(engine.get("never-written").unwrap().is_none());
    }

    #[test]
    fn replace_keeps_single_entry() {
        let engine = MemoryEngine::with_shard_count(2);
        engine.put("alpha".to_string(), value(b"one")).unwrap();
        engine.put("alpha".to_string(), value(b"three")).unwrap();

        assert_eq!(&engine.get("alpha").unwrap().unwrap()[..], b"three");
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.used_bytes(), "alpha".len() + "three".len());
    }

    #[test]
    fn accepts_any_key_and_value_size() {
        let engine = MemoryEngine::with_shard_count(1);
        let long = "k".repeat(4096);
        let large = Bytes::from(vec![7u8; 2 * 1024 * 1024]);

        engine.put(long.clone(), large.clone()).unwrap();
        assert_eq!(engine.get(&long).unwrap(), Some(large));

        assert!(engine.get("").unwrap().is_none());
        engine.put(String::new(), value(b"empty")).unwrap();
        assert_eq!(&engine.get("").unwrap().unwrap()[..], b"empty");
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn unwritten_long_key_is_none() {
        let engine = MemoryEngine::with_shard_count(2);
        assert!(engine.get(&"x".repeat(300)).unwrap().is_none());
    }

    #[test]
    fn huge_limit_walks_everything() {
        let engine = MemoryEngine::with_shard_count(2);
        for i in 0..10 {
            engine.put(format!("key-{i}"), value(b"v")).unwrap();
        }
        assert_eq!(engine.sample(i64::MAX).len(), 10);
    }

    #[test]
    fn sample_is_bounded() {
        let engine = MemoryEngine::with_shard_count(8);
        for i in 0..50 {
            engine.put(format!("key-{i}"), value(b"v")).unwrap();
        }

        assert_eq!(engine.sample(1).len(), 1);
        let five = engine.sample(5);
        assert_eq!(five.len(), 5);
        let distinct: HashSet<_> = five.iter().collect();
        assert_eq!(distinct.len(), 5);
        assert_eq!(engine.sample(500).len(), 50);
    }

    #[test]
    fn non_positive_sample_returns_everything() {
        let engine = MemoryEngine::with_shard_count(4);
        for i in 0..20 {
            engine.put(format!("key-{i}"), value(b"v")).unwrap();
        }
        assert_eq!(engine.sample(0).len(), 20);
        assert_eq!(engine.sample(-3).len(), 20);
    }

    #[test]
    fn visitor_can_stop_early() {
        let engine = MemoryEngine::with_shard_count(4);
        for i in 0..20 {
            engine.put(format!("key-{i}"), value(b"v")).unwrap();
        }
        let mut seen = 0;
        engine.for_each_key(0, &mut |_| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn shard_count_is_power_of_two() {
        assert_eq!(MemoryEngine::with_shard_count(5).shard_count(), 8);
        assert_eq!(MemoryEngine::with_shard_count(1).shard_count(), 1);
        assert!(MemoryEngine::with_shard_count_and_capacity(0, 100)
            .shard_count()
            .is_power_of_two());
    }
}
