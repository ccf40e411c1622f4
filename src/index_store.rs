//! Index store: the primary `full_path_id -> EntryRecord` map plus the
//! auxiliary [`PathTrie`], kept in lock-step behind a single mutation path so
//! no reader ever observes a torn update across the two structures.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::entry::EntryRecord;
use crate::path_trie::PathTrie;
use crate::string_pool::StringPool;

/// Aggregate counters surfaced to the orchestrator and CLI.
#[derive(Debug, Clone, Default)]
pub struct IndexStatistics {
    pub total_files: u64,
    pub total_dirs: u64,
    pub total_bytes: u64,
    pub extensions: HashMap<String, u64>,
}

struct Inner {
    by_path: HashMap<u32, EntryRecord>,
    stats: IndexStatistics,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            by_path: HashMap::new(),
            stats: IndexStatistics::default(),
        }
    }
}

/// The in-memory entry table plus its path trie. `add`/`update`/`remove` all
/// take the same `RwLock` write guard so the store/trie invariant in
/// `store.count == trie.count` never has a visible torn window.
pub struct IndexStore {
    inner: RwLock<Inner>,
    trie: PathTrie,
}

impl Default for IndexStore {
    fn default() -> Self {
        IndexStore {
            inner: RwLock::new(Inner::default()),
            trie: PathTrie::new(),
        }
    }
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry` keyed by its `full_path_id`. Returns `false` (no-op) if
    /// that path already existed — callers re-issue as `update` in that case.
    pub fn add(&self, pool: &StringPool, dir_segments: &[u32], entry: EntryRecord) -> bool {
        let mut inner = self.inner.write();
        if inner.by_path.contains_key(&entry.full_path_id) {
            return false;
        }
        self.account(&mut inner.stats, pool, &entry, 1);
        inner.by_path.insert(entry.full_path_id, entry);
        self.trie.add(dir_segments, entry.full_path_id);
        true
    }

    /// Bulk insert: takes the write lock once for the whole batch instead of
    /// once per entry, the same amortization [`crate::persistence::Persistence::add_batch`]
    /// applies to its triggers/transaction. Entries whose `full_path_id`
    /// already exists are skipped, exactly like `add`. Returns the number of
    /// entries actually inserted.
    pub fn add_batch(&self, pool: &StringPool, batch: &[(Vec<u32>, EntryRecord)]) -> usize {
        let mut inner = self.inner.write();
        let mut inserted = 0usize;
        for (dir_segments, entry) in batch {
            if inner.by_path.contains_key(&entry.full_path_id) {
                continue;
            }
            self.account(&mut inner.stats, pool, entry, 1);
            inner.by_path.insert(entry.full_path_id, *entry);
            self.trie.add(dir_segments, entry.full_path_id);
            inserted += 1;
        }
        inserted
    }

    /// Upsert: unconditionally replaces any existing record at the same path.
    /// `full_path_id` (and therefore `dir_id`) never changes across an
    /// upsert — a path moving to a new directory is a different
    /// `full_path_id` and goes through `remove` + `add` instead (as the
    /// Change Monitor does for `Renamed`).
    pub fn update(&self, pool: &StringPool, dir_segments: &[u32], entry: EntryRecord) {
        let mut inner = self.inner.write();
        let already_present = if let Some(old) = inner.by_path.get(&entry.full_path_id).copied() {
            debug_assert_eq!(old.dir_id, entry.dir_id, "upsert must not change directory");
            self.account(&mut inner.stats, pool, &old, -1);
            true
        } else {
            false
        };
        self.account(&mut inner.stats, pool, &entry, 1);
        inner.by_path.insert(entry.full_path_id, entry);
        if !already_present {
            self.trie.add(dir_segments, entry.full_path_id);
        }
    }

    pub fn remove(&self, pool: &StringPool, dir_segments: &[u32], full_path_id: u32) -> bool {
        let mut inner = self.inner.write();
        match inner.by_path.remove(&full_path_id) {
            Some(old) => {
                self.account(&mut inner.stats, pool, &old, -1);
                self.trie.remove(dir_segments, full_path_id);
                true
            }
            None => false,
        }
    }

    /// Remove every entry whose directory lies at or beneath
    /// `prefix_segments` in one step, used by a scoped refresh (spec §4.9's
    /// `refresh(prefixes)`, distinct from `clear`'s full wipe): the trie
    /// drops the whole subtree at once instead of the caller re-deriving
    /// each entry's own directory segments to call `remove` one at a time.
    /// Returns the number of entries removed.
    pub fn remove_subtree(&self, pool: &StringPool, prefix_segments: &[u32]) -> usize {
        let mut inner = self.inner.write();
        let ids = self.trie.remove_subtree(prefix_segments);
        let mut removed = 0usize;
        for id in &ids {
            if let Some(old) = inner.by_path.remove(id) {
                self.account(&mut inner.stats, pool, &old, -1);
                removed += 1;
            }
        }
        removed
    }

    pub fn get(&self, full_path_id: u32) -> Option<EntryRecord> {
        self.inner.read().by_path.get(&full_path_id).copied()
    }

    pub fn contains(&self, full_path_id: u32) -> bool {
        self.inner.read().by_path.contains_key(&full_path_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry currently in the store, in arbitrary order.
    pub fn snapshot(&self) -> Vec<EntryRecord> {
        self.inner.read().by_path.values().copied().collect()
    }

    pub fn entries_in_dir(&self, dir_segments: &[u32], recursive: bool) -> Vec<EntryRecord> {
        let ids = if recursive {
            self.trie.entries_under(dir_segments)
        } else {
            self.trie.entries_in(dir_segments)
        };
        let inner = self.inner.read();
        ids.into_iter()
            .filter_map(|id| inner.by_path.get(&id).copied())
            .collect()
    }

    pub fn trie(&self) -> &PathTrie {
        &self.trie
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_path.clear();
        inner.stats = IndexStatistics::default();
        self.trie.clear();
    }

    pub fn statistics(&self) -> IndexStatistics {
        self.inner.read().stats.clone()
    }

    /// Shrink backing collections after a bulk load.
    pub fn optimize(&self) {
        let mut inner = self.inner.write();
        inner.by_path.shrink_to_fit();
        inner.stats.extensions.shrink_to_fit();
    }

    fn account(&self, stats: &mut IndexStatistics, pool: &StringPool, e: &EntryRecord, delta: i64) {
        if e.is_directory() {
            stats.total_dirs = (stats.total_dirs as i64 + delta).max(0) as u64;
        } else {
            stats.total_files = (stats.total_files as i64 + delta).max(0) as u64;
            stats.total_bytes = (stats.total_bytes as i64 + delta * e.size as i64).max(0) as u64;
            if e.ext_id != 0 {
                let ext = pool.get_name(e.ext_id);
                let counter = stats.extensions.entry(ext).or_insert(0);
                *counter = (*counter as i64 + delta).max(0) as u64;
            }
        }
    }
}
