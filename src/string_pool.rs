//! String interning: two independent sub-pools (`paths`, `names`) mapping
//! normalized strings to small integer ids and back. Ids from one sub-pool
//! must never be compared against ids from the other.
//!
//! Each sub-pool shards its map across a fixed number of `RwLock`-guarded
//! buckets, chosen by a hash of the normalized bytes, so concurrent enumerator
//! workers interning from different directories don't serialize on one global
//! lock. Reads are plain `RwLock::read()`; only a genuine cache miss takes the
//! write lock for its shard.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};

const SHARD_COUNT: usize = 16;
const EMPTY_ID: u32 = 0;

fn shard_of(bytes: &[u8]) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash as usize) & (SHARD_COUNT - 1)
}

#[derive(Default)]
struct Shard {
    ids: HashMap<Box<str>, u32>,
}

/// A single interning table. Two of these (paths, names) make up [`StringPool`].
pub struct InternTable {
    shards: Vec<RwLock<Shard>>,
    strings: RwLock<Vec<Box<str>>>,
    next_id: AtomicU32,
}

impl InternTable {
    fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(Shard::default()));
        }
        InternTable {
            shards,
            strings: RwLock::new(vec!["".into()]),
            next_id: AtomicU32::new(1),
        }
    }

    /// Intern `normalized` (already case/separator normalized by the caller)
    /// and return its id. Zero-allocation on cache hit.
    pub fn intern(&self, normalized: &str) -> EngineResult<u32> {
        if normalized.is_empty() {
            return Ok(EMPTY_ID);
        }
        let shard_idx = shard_of(normalized.as_bytes());
        {
            let shard = self.shards[shard_idx].read();
            if let Some(&id) = shard.ids.get(normalized) {
                return Ok(id);
            }
        }
        let mut shard = self.shards[shard_idx].write();
        if let Some(&id) = shard.ids.get(normalized) {
            return Ok(id);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id >= (1u32 << 31) {
            self.next_id.store(id, Ordering::Relaxed);
            return Err(EngineError::PoolExhausted);
        }
        let boxed: Box<str> = normalized.into();
        shard.ids.insert(boxed.clone(), id);
        drop(shard);
        let mut strings = self.strings.write();
        if strings.len() <= id as usize {
            strings.resize_with(id as usize + 1, || "".into());
        }
        strings[id as usize] = boxed;
        Ok(id)
    }

    /// Look up an id without interning; `None` on miss.
    pub fn try_lookup(&self, normalized: &str) -> Option<u32> {
        if normalized.is_empty() {
            return Some(EMPTY_ID);
        }
        let shard = self.shards[shard_of(normalized.as_bytes())].read();
        shard.ids.get(normalized).copied()
    }

    /// Resolve an id back to its canonical string. Panics on an id that was
    /// never returned by `intern` on this table — callers control ids
    /// entirely through this type so that should never happen.
    pub fn get(&self, id: u32) -> String {
        let strings = self.strings.read();
        strings
            .get(id as usize)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.strings.read().len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn approx_bytes(&self) -> usize {
        let strings = self.strings.read();
        strings.iter().map(|s| s.len() + 24).sum()
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().ids.clear();
        }
        *self.strings.write() = vec!["".into()];
        self.next_id.store(1, Ordering::Relaxed);
    }
}

/// Interning statistics surfaced to the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub interned: usize,
    pub approx_bytes: usize,
}

/// Normalize a path: lowercase and rewrite separators to the OS-native one.
/// This is the canonical form stored by the `paths` sub-pool and compared by
/// every prefix/equality check elsewhere in the crate.
pub fn normalize_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '/' || ch == '\\' {
            out.push(std::path::MAIN_SEPARATOR);
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

/// Normalize a bare name (no separators expected, but tolerated).
pub fn normalize_name(raw: &str) -> String {
    raw.to_lowercase()
}

/// Process-wide bidirectional string tables: `paths` for full paths and
/// directory paths, `names` for bare file/segment names. Kept as two pools so
/// path ids and name ids are never interchangeable by construction.
pub struct StringPool {
    pub paths: InternTable,
    pub names: InternTable,
}

impl Default for StringPool {
    fn default() -> Self {
        StringPool {
            paths: InternTable::new(),
            names: InternTable::new(),
        }
    }
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_path(&self, raw: &str) -> EngineResult<u32> {
        self.paths.intern(&normalize_path(raw))
    }

    pub fn intern_name(&self, raw: &str) -> EngineResult<u32> {
        self.names.intern(&normalize_name(raw))
    }

    pub fn get_path(&self, id: u32) -> String {
        self.paths.get(id)
    }

    pub fn get_name(&self, id: u32) -> String {
        self.names.get(id)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            interned: self.paths.len() + self.names.len(),
            approx_bytes: self.paths.approx_bytes() + self.names.approx_bytes(),
        }
    }

    pub fn clear(&self) {
        self.paths.clear();
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_id_zero() {
        let pool = StringPool::new();
        assert_eq!(pool.intern_path("").unwrap(), 0);
        assert_eq!(pool.get_path(0), "");
    }

    #[test]
    fn intern_idempotent() {
        let pool = StringPool::new();
        let a = pool.intern_path("/Users/Foo/Bar.txt").unwrap();
        let b = pool.intern_path("/users/foo/bar.txt").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.get_path(a), normalize_path("/Users/Foo/Bar.txt"));
    }

    #[test]
    fn paths_and_names_are_independent_sequences() {
        let pool = StringPool::new();
        let p = pool.intern_path("readme.md").unwrap();
        let n = pool.intern_name("readme.md").unwrap();
        assert_eq!(p, n, "first interned id in each fresh sub-pool is 1");
        assert_eq!(pool.get_name(n), "readme.md");
    }

    #[test]
    fn try_lookup_misses_without_inserting() {
        let pool = StringPool::new();
        assert_eq!(pool.paths.try_lookup("nope"), None);
        assert_eq!(pool.paths.len(), 0);
    }

    #[test]
    fn concurrent_intern_same_id() {
        use std::sync::Arc;
        let pool = Arc::new(StringPool::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                pool.intern_path("/shared/path/value.bin").unwrap()
            }));
        }
        let ids: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
