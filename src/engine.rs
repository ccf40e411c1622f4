//! Search Engine orchestrator: the public facade wiring the String
//! Pool, Index Store, Platform Enumerator, Change Monitor, and Persistence
//! layer together behind lifecycle methods, mirroring the shape of the
//! teacher's own top-level indexer/search driver in `main.rs` — a single
//! struct owning the long-lived state, one `AtomicBool` guarding against a
//! second indexing run, and a subscriber list fed by every component that
//! produces progress events.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::entry::EntryRecord;
use crate::enumerator::{self, EnumerationHandle};
use crate::error::{EngineError, EngineResult};
use crate::index_store::{IndexStatistics, IndexStore};
use crate::matcher::MatcherStats;
use crate::persistence::{Persistence, PersistedEntry};
use crate::query::{self, CompiledQuery, SearchQuery, SearchResult};
use crate::string_pool::StringPool;
use crate::watcher::{ChangeKind, ChangeMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingPhase {
    Initializing,
    Scanning,
    Indexing,
    Completed,
    Failed,
    Cancelled,
}

/// Events an engine consumer can subscribe to via [`SearchEngine::subscribe`].
/// Delivered best-effort: a full subscriber channel drops events rather than
/// blocking the engine (mirrors the Change Monitor's own drop-oldest policy).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    IndexingProgress {
        phase: IndexingPhase,
        count: u64,
        elapsed: std::time::Duration,
        current_path: Option<PathBuf>,
    },
    SearchProgress {
        matches: u64,
        processed: u64,
        elapsed: std::time::Duration,
        phase: &'static str,
    },
    FileChanged {
        kind: ChangeKind,
        old_path: Option<PathBuf>,
        new_path: Option<PathBuf>,
    },
}

/// Directory segments for a prefix path, the way the enumerator derives them
/// for each entry it walks — used by scoped refresh to find the trie subtree
/// a root corresponds to before re-walking it.
fn dir_segments_of(pool: &StringPool, path: &std::path::Path) -> Vec<u32> {
    crate::string_pool::normalize_path(&path.to_string_lossy())
        .split(std::path::MAIN_SEPARATOR)
        .filter(|s| !s.is_empty())
        .filter_map(|s| pool.intern_name(s).ok())
        .collect()
}

fn entry_fields(e: &EntryRecord) -> (u64, u64, u64, u64, u8, u8) {
    (e.size, e.created_utc, e.modified_utc, e.accessed_utc, e.attributes.bits(), e.volume_tag)
}

fn to_persisted(pool: &StringPool, e: &EntryRecord) -> PersistedEntry {
    let (size, created_utc, modified_utc, accessed_utc, attr_bits, volume) = entry_fields(e);
    PersistedEntry {
        full_path: pool.get_path(e.full_path_id),
        name: pool.get_name(e.name_id),
        dir: pool.get_path(e.dir_id),
        ext: pool.get_name(e.ext_id),
        size,
        created_utc,
        modified_utc,
        accessed_utc,
        attr_bits,
        volume,
    }
}

/// Engine-level counters distinct from [`IndexStatistics`]'s per-index
/// file/dir/byte aggregates: how many searches have run against this engine
/// and how long indexing/search took, tracked across its lifetime.
#[derive(Debug, Clone, Default)]
pub struct EngineStatistics {
    pub total_searches: u64,
    pub last_indexing_duration: Option<Duration>,
    pub last_search_latency: Option<Duration>,
    pub avg_search_latency: Option<Duration>,
}

/// Top-level facade. Holds the in-memory index for the whole process
/// lifetime; indexing, searching, monitoring, and persistence all operate
/// against the same `Arc<IndexStore>`/`Arc<StringPool>` pair.
pub struct SearchEngine {
    config: EngineConfig,
    pool: Arc<StringPool>,
    store: Arc<IndexStore>,
    matcher_stats: MatcherStats,
    subscribers: Arc<RwLock<Vec<Sender<EngineEvent>>>>,
    indexing_active: Arc<AtomicBool>,
    current_cancel: RwLock<Option<CancellationToken>>,
    monitor: RwLock<Option<ChangeMonitor>>,
    persistence: RwLock<Option<Persistence>>,
    total_searches: AtomicU64,
    search_latency_sum_nanos: AtomicU64,
    last_search_latency: RwLock<Option<Duration>>,
    last_indexing_duration: RwLock<Option<Duration>>,
}

impl SearchEngine {
    pub fn new(config: EngineConfig) -> Self {
        SearchEngine {
            config,
            pool: Arc::new(StringPool::new()),
            store: Arc::new(IndexStore::new()),
            matcher_stats: MatcherStats::default(),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            indexing_active: Arc::new(AtomicBool::new(false)),
            current_cancel: RwLock::new(None),
            monitor: RwLock::new(None),
            persistence: RwLock::new(None),
            total_searches: AtomicU64::new(0),
            search_latency_sum_nanos: AtomicU64::new(0),
            last_search_latency: RwLock::new(None),
            last_indexing_duration: RwLock::new(None),
        }
    }

    /// Receive a clone of every [`EngineEvent`] emitted from now on. Several
    /// subscribers may coexist; each gets its own channel.
    pub fn subscribe(&self, sender: Sender<EngineEvent>) {
        self.subscribers.write().push(sender);
    }

    fn emit(&self, event: EngineEvent) {
        self.subscribers.read().retain(|s| s.send(event.clone()).is_ok());
    }

    /// Walk `config.indexing.roots` end to end, populating the Index Store.
    /// Refuses to start a second run while one is already in flight
    /// (`EngineError::AlreadyInProgress`); starts the Change Monitor
    /// afterwards if `enable_monitoring` is set.
    pub fn start_indexing(&self) -> EngineResult<u64> {
        self.indexing_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::AlreadyInProgress)?;
        let result = self.run_indexing();
        self.indexing_active.store(false, Ordering::SeqCst);
        result
    }

    fn run_indexing(&self) -> EngineResult<u64> {
        let t0 = Instant::now();
        let cancel = CancellationToken::new();
        *self.current_cancel.write() = Some(cancel.clone());

        self.emit(EngineEvent::IndexingProgress {
            phase: IndexingPhase::Initializing,
            count: 0,
            elapsed: t0.elapsed(),
            current_path: None,
        });

        if self.config.indexing.roots.is_empty() {
            return Err(EngineError::InvalidInput("no indexing roots configured".into()));
        }

        let handle: EnumerationHandle = enumerator::spawn(
            self.config.indexing.roots.clone(),
            self.config.indexing.clone(),
            Arc::clone(&self.pool),
            cancel.clone(),
        );
        let mut count: u64 = 0;
        self.emit(EngineEvent::IndexingProgress {
            phase: IndexingPhase::Scanning,
            count,
            elapsed: t0.elapsed(),
            current_path: None,
        });

        let batch_size = self.config.indexing.batch_size.max(1);
        let mut batch: Vec<(Vec<u32>, EntryRecord)> = Vec::with_capacity(batch_size);
        let mut last_path = None;
        while let Ok(enumerated) = handle.entries.recv() {
            if cancel.is_cancelled() {
                break;
            }
            last_path = Some(enumerated.record.full_path_id);
            batch.push((enumerated.dir_segments, enumerated.record));
            if batch.len() >= batch_size {
                count += self.store.add_batch(&self.pool, &batch) as u64;
                batch.clear();
                self.emit(EngineEvent::IndexingProgress {
                    phase: IndexingPhase::Indexing,
                    count,
                    elapsed: t0.elapsed(),
                    current_path: last_path.map(|id| PathBuf::from(self.pool.get_path(id))),
                });
            }
        }
        if !batch.is_empty() {
            count += self.store.add_batch(&self.pool, &batch) as u64;
        }

        handle.join();
        self.store.optimize();
        *self.current_cancel.write() = None;
        let elapsed = t0.elapsed();
        *self.last_indexing_duration.write() = Some(elapsed);
        log::debug!(target: "fastfind::perf", "indexing {count} entries took {elapsed:?}");

        let phase = if cancel.is_cancelled() {
            IndexingPhase::Cancelled
        } else {
            IndexingPhase::Completed
        };
        self.emit(EngineEvent::IndexingProgress {
            phase,
            count,
            elapsed: t0.elapsed(),
            current_path: None,
        });

        if phase == IndexingPhase::Completed && self.config.indexing.enable_monitoring {
            self.start_monitoring()?;
        }

        Ok(count)
    }

    fn start_monitoring(&self) -> EngineResult<()> {
        let monitor = ChangeMonitor::start(
            self.config.indexing.roots.clone(),
            self.config.monitor.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            Arc::clone(&self.subscribers),
        )
        .map_err(|e| EngineError::Io {
            path: None,
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;
        *self.monitor.write() = Some(monitor);
        Ok(())
    }

    /// Cancel an in-flight `start_indexing` call. A no-op if none is running.
    pub fn stop_indexing(&self) {
        if let Some(cancel) = self.current_cancel.read().as_ref() {
            cancel.cancel();
        }
    }

    /// Stop the Change Monitor, if running.
    pub fn stop_monitoring(&self) {
        if let Some(monitor) = self.monitor.write().take() {
            monitor.stop();
        }
    }

    /// Re-run indexing against `prefixes`, or against every configured root
    /// when `prefixes` is empty. An empty slice is a full `clear` + rebuild;
    /// a non-empty one only drops and re-walks the matching subtree(s),
    /// leaving the rest of the store untouched — the distinct "RefreshIndex
    /// for a prefix" path, as opposed to a full `Clear`.
    pub fn refresh(&self, prefixes: &[PathBuf]) -> EngineResult<u64> {
        if prefixes.is_empty() {
            self.store.clear();
            return self.start_indexing();
        }

        self.indexing_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::AlreadyInProgress)?;
        let result = self.run_scoped_refresh(prefixes);
        self.indexing_active.store(false, Ordering::SeqCst);
        result
    }

    fn run_scoped_refresh(&self, prefixes: &[PathBuf]) -> EngineResult<u64> {
        let t0 = Instant::now();
        let cancel = CancellationToken::new();
        *self.current_cancel.write() = Some(cancel.clone());

        for prefix in prefixes {
            let segs = dir_segments_of(&self.pool, prefix);
            self.store.remove_subtree(&self.pool, &segs);
        }

        let handle: EnumerationHandle = enumerator::spawn(
            prefixes.to_vec(),
            self.config.indexing.clone(),
            Arc::clone(&self.pool),
            cancel.clone(),
        );

        let batch_size = self.config.indexing.batch_size.max(1);
        let mut batch: Vec<(Vec<u32>, EntryRecord)> = Vec::with_capacity(batch_size);
        let mut count: u64 = 0;
        while let Ok(enumerated) = handle.entries.recv() {
            if cancel.is_cancelled() {
                break;
            }
            batch.push((enumerated.dir_segments, enumerated.record));
            if batch.len() >= batch_size {
                count += self.store.add_batch(&self.pool, &batch) as u64;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            count += self.store.add_batch(&self.pool, &batch) as u64;
        }

        handle.join();
        self.store.optimize();
        *self.current_cancel.write() = None;
        let elapsed = t0.elapsed();
        *self.last_indexing_duration.write() = Some(elapsed);
        log::debug!(
            target: "fastfind::perf",
            "scoped refresh of {} prefix(es), {count} entries, took {elapsed:?}",
            prefixes.len()
        );
        self.emit(EngineEvent::IndexingProgress {
            phase: IndexingPhase::Completed,
            count,
            elapsed,
            current_path: None,
        });
        Ok(count)
    }

    /// Run `query` against the current index, with no way for the caller to
    /// cancel mid-stream. Equivalent to [`SearchEngine::search_with_cancel`]
    /// with a token nobody else holds.
    pub fn search(&self, query: SearchQuery) -> EngineResult<SearchResult> {
        self.search_with_cancel(query, &CancellationToken::new())
    }

    /// Run `query` against the current index, checking `cancel` between
    /// batches so another thread can stop a long-running search early —
    /// the cancellation contract the plain [`SearchEngine::search`] has no
    /// way to honor since it never exposes its token to the caller.
    pub fn search_with_cancel(&self, query: SearchQuery, cancel: &CancellationToken) -> EngineResult<SearchResult> {
        let compiled: CompiledQuery = query::compile(query, &self.pool)?;
        let t0 = Instant::now();
        let result = compiled.evaluate(&self.store, &self.pool, &self.matcher_stats, cancel);
        let elapsed = t0.elapsed();
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        self.search_latency_sum_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        *self.last_search_latency.write() = Some(elapsed);
        log::debug!(target: "fastfind::perf", "search matched {} in {elapsed:?}", result.total);
        self.emit(EngineEvent::SearchProgress {
            matches: result.total as u64,
            processed: result.returned as u64,
            elapsed,
            phase: "complete",
        });
        Ok(result)
    }

    pub fn statistics(&self) -> IndexStatistics {
        self.store.statistics()
    }

    /// Total searches run, and indexing/search latency, tracked for the
    /// lifetime of this engine instance (reset only by process restart).
    pub fn engine_statistics(&self) -> EngineStatistics {
        let total_searches = self.total_searches.load(Ordering::Relaxed);
        let sum_nanos = self.search_latency_sum_nanos.load(Ordering::Relaxed);
        let avg_search_latency = if total_searches > 0 {
            Some(Duration::from_nanos(sum_nanos / total_searches))
        } else {
            None
        };
        EngineStatistics {
            total_searches,
            last_indexing_duration: *self.last_indexing_duration.read(),
            last_search_latency: *self.last_search_latency.read(),
            avg_search_latency,
        }
    }

    pub fn clear_cache(&self) {
        self.store.clear();
        self.pool.clear();
    }

    /// Open (or create) the on-disk store at `config.persistence.path` and
    /// flush the current in-memory index into it.
    pub fn save(&self) -> EngineResult<()> {
        let mut guard = self.persistence.write();
        let persistence = match guard.as_mut() {
            Some(p) => p,
            None => {
                *guard = Some(Persistence::init(
                    &self.config.persistence.path,
                    self.config.persistence.mode,
                    self.config.persistence.fts_bulk_threshold,
                )?);
                guard.as_mut().unwrap()
            }
        };
        persistence.clear()?;
        let snapshot = self.store.snapshot();
        // String Pool reads are lock-free on the hit path, so resolving every
        // record's text columns in parallel (as the teacher's own MFT indexer
        // does for its bulk record pass) pays off once the index is large.
        let rows: Vec<PersistedEntry> = snapshot.par_iter().map(|e| to_persisted(&self.pool, e)).collect();
        persistence.add_batch(&rows)?;
        persistence.optimize()
    }

    /// Load the on-disk store at `config.persistence.path` into the in-memory
    /// index, replacing whatever is currently held.
    pub fn load(&self) -> EngineResult<u64> {
        let mut guard = self.persistence.write();
        let persistence = match guard.as_mut() {
            Some(p) => p,
            None => {
                *guard = Some(Persistence::init(
                    &self.config.persistence.path,
                    self.config.persistence.mode,
                    self.config.persistence.fts_bulk_threshold,
                )?);
                guard.as_mut().unwrap()
            }
        };
        self.store.clear();
        let result = persistence.search(&SearchQuery::default())?;
        let mut count = 0u64;
        for row in &result.entries {
            if let Some(entry) = rebuild_entry(&self.pool, row) {
                let dir_segments: Vec<u32> = crate::string_pool::normalize_path(&row.dir)
                    .split(std::path::MAIN_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| self.pool.intern_name(s).ok())
                    .collect();
                self.store.add(&self.pool, &dir_segments, entry);
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn optimize(&self) -> EngineResult<()> {
        self.store.optimize();
        if let Some(p) = self.persistence.write().as_mut() {
            p.optimize()?;
        }
        Ok(())
    }

    /// Tear down the monitor and in-flight cancellation token, dropping the
    /// persistence handle. Leaves the in-memory index intact.
    pub fn dispose(&self) {
        self.stop_indexing();
        self.stop_monitoring();
        *self.persistence.write() = None;
    }

    pub fn pool(&self) -> &Arc<StringPool> {
        &self.pool
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }
}

fn rebuild_entry(pool: &StringPool, row: &PersistedEntry) -> Option<EntryRecord> {
    let full_path_id = pool.intern_path(&row.full_path).ok()?;
    let name_id = pool.intern_name(&row.name).ok()?;
    let dir_id = pool.intern_path(&row.dir).ok()?;
    let ext_id = if row.ext.is_empty() {
        0
    } else {
        pool.intern_name(&row.ext).ok()?
    };
    Some(EntryRecord::new(
        full_path_id,
        name_id,
        dir_id,
        ext_id,
        row.size,
        row.created_utc,
        row.modified_utc,
        row.accessed_utc,
        crate::entry::EntryAttributes::from_bits_truncate(row.attr_bits),
        row.volume,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_indexing_run_while_active_is_rejected() {
        let engine = SearchEngine::new(EngineConfig::default());
        engine.indexing_active.store(true, Ordering::SeqCst);
        let err = engine.start_indexing().unwrap_err();
        assert!(matches!(err, EngineError::AlreadyInProgress));
    }

    #[test]
    fn search_against_empty_store_returns_no_matches() {
        let engine = SearchEngine::new(EngineConfig::default());
        let result = engine.search(SearchQuery::default()).unwrap();
        assert_eq!(result.total, 0);
    }

    #[test]
    fn missing_roots_is_invalid_input() {
        let engine = SearchEngine::new(EngineConfig::default());
        let err = engine.start_indexing().unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn engine_statistics_track_search_count_and_latency() {
        let engine = SearchEngine::new(EngineConfig::default());
        assert_eq!(engine.engine_statistics().total_searches, 0);
        engine.search(SearchQuery::default()).unwrap();
        engine.search(SearchQuery::default()).unwrap();
        let stats = engine.engine_statistics();
        assert_eq!(stats.total_searches, 2);
        assert!(stats.last_search_latency.is_some());
        assert!(stats.avg_search_latency.is_some());
        assert!(stats.last_indexing_duration.is_none());
    }
}
