//! Change monitor: cross-platform filesystem watching via the `notify`
//! crate (already a teacher dependency, previously wired up only for a
//! Windows-only corner through raw FSEvents FFI on macOS — this crate uses
//! `notify` as the default backend on every platform instead). Raw events
//! land in a bounded `crossbeam_channel` with drop-oldest overflow; a single
//! consumer thread coalesces same-path events within the debounce window,
//! mirroring the shape of the teacher's own watcher-to-index bridge.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, TrySendError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::MonitorOptions;
use crate::engine::EngineEvent;
use crate::entry::EntryRecord;
use crate::enumerator;
use crate::ignore_policy::IgnorePolicy;
use crate::index_store::IndexStore;
use crate::string_pool::StringPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

struct PendingChange {
    kind: ChangeKind,
    renamed_from: Option<PathBuf>,
    last_seen: Instant,
}

/// Owns the OS watcher handle and the consumer thread; dropping it stops
/// watching and joins the consumer.
pub struct ChangeMonitor {
    _watcher: RecommendedWatcher,
    consumer: Option<std::thread::JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl ChangeMonitor {
    pub fn start(
        roots: Vec<PathBuf>,
        options: MonitorOptions,
        store: Arc<IndexStore>,
        pool: Arc<StringPool>,
        subscribers: Arc<parking_lot::RwLock<Vec<Sender<EngineEvent>>>>,
    ) -> notify::Result<Self> {
        let (raw_tx, raw_rx) = bounded::<Event>(options.buffer_size.max(1));
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                // Drop-oldest overflow: if the bounded channel is full, pull
                // one item off and retry once rather than blocking the OS
                // watcher's callback thread.
                if let Err(TrySendError::Full(event)) = raw_tx.try_send(event) {
                    let _ = raw_rx.try_recv();
                    let _ = raw_tx.try_send(event);
                }
            }
        })?;

        for root in &roots {
            let mode = if options.include_subdirectories {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(root, mode)?;
        }

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let policy = IgnorePolicy::new(&options.excluded_paths, &[]);
        let debounce = Duration::from_millis(options.debounce_interval_ms);
        let consumer = std::thread::spawn(move || {
            consume_loop(raw_rx, debounce, policy, store, pool, subscribers, stop_clone);
        });

        Ok(ChangeMonitor {
            _watcher: watcher,
            consumer: Some(consumer),
            stop,
        })
    }

    pub fn stop(mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
    }
}

fn consume_loop(
    raw_rx: Receiver<Event>,
    debounce: Duration,
    policy: IgnorePolicy,
    store: Arc<IndexStore>,
    pool: Arc<StringPool>,
    subscribers: Arc<parking_lot::RwLock<Vec<Sender<EngineEvent>>>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
) {
    let mut ledger: HashMap<PathBuf, PendingChange> = HashMap::new();
    loop {
        if stop.load(std::sync::atomic::Ordering::SeqCst) {
            break;
        }
        match raw_rx.recv_timeout(debounce) {
            Ok(event) => {
                record_event(&mut ledger, event, &policy);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
        flush_ready(&mut ledger, debounce, &store, &pool, &subscribers);
    }
    // Final flush of anything still pending at shutdown.
    flush_all(&mut ledger, &store, &pool, &subscribers);
}

fn record_event(ledger: &mut HashMap<PathBuf, PendingChange>, event: Event, policy: &IgnorePolicy) {
    use notify::event::{ModifyKind, RenameMode};

    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if let [from, to] = event.paths.as_slice() {
            if !policy.is_path_excluded(to) {
                log::debug!("watcher: rename {} -> {}", from.display(), to.display());
                ledger.insert(
                    to.clone(),
                    PendingChange {
                        kind: ChangeKind::Renamed,
                        renamed_from: Some(from.clone()),
                        last_seen: Instant::now(),
                    },
                );
            } else {
                log::debug!(
                    "watcher: rename destination {} is excluded, removing old path {}",
                    to.display(),
                    from.display()
                );
                ledger.insert(
                    from.clone(),
                    PendingChange {
                        kind: ChangeKind::Deleted,
                        renamed_from: None,
                        last_seen: Instant::now(),
                    },
                );
            }
            return;
        }
    }

    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        _ => return,
    };
    for path in event.paths {
        if policy.is_path_excluded(&path) {
            log::debug!("watcher: ignoring excluded path {}", path.display());
            continue;
        }
        let coalesced = ledger.contains_key(&path);
        ledger
            .entry(path.clone())
            .and_modify(|p| {
                p.kind = kind;
                p.last_seen = Instant::now();
            })
            .or_insert(PendingChange {
                kind,
                renamed_from: None,
                last_seen: Instant::now(),
            });
        if coalesced {
            log::debug!("watcher: coalescing {kind:?} into pending change for {}", path.display());
        }
    }
}

fn flush_ready(
    ledger: &mut HashMap<PathBuf, PendingChange>,
    debounce: Duration,
    store: &IndexStore,
    pool: &StringPool,
    subscribers: &Arc<parking_lot::RwLock<Vec<Sender<EngineEvent>>>>,
) {
    let now = Instant::now();
    let ready: Vec<PathBuf> = ledger
        .iter()
        .filter(|(_, p)| now.duration_since(p.last_seen) >= debounce)
        .map(|(path, _)| path.clone())
        .collect();
    if !ready.is_empty() {
        log::debug!("watcher: debounce window elapsed, flushing {} path(s)", ready.len());
    }
    for path in ready {
        if let Some(change) = ledger.remove(&path) {
            apply_change(&path, change, store, pool, subscribers);
        }
    }
}

fn flush_all(
    ledger: &mut HashMap<PathBuf, PendingChange>,
    store: &IndexStore,
    pool: &StringPool,
    subscribers: &Arc<parking_lot::RwLock<Vec<Sender<EngineEvent>>>>,
) {
    if !ledger.is_empty() {
        log::debug!("watcher: final flush of {} pending path(s) at shutdown", ledger.len());
    }
    for (path, change) in ledger.drain() {
        apply_change(&path, change, store, pool, subscribers);
    }
}

fn apply_change(
    path: &Path,
    change: PendingChange,
    store: &IndexStore,
    pool: &StringPool,
    subscribers: &Arc<parking_lot::RwLock<Vec<Sender<EngineEvent>>>>,
) {
    log::debug!("watcher: applying {:?} for {}", change.kind, path.display());
    let mut new_record: Option<EntryRecord> = None;
    match change.kind {
        ChangeKind::Created | ChangeKind::Modified => {
            if let Some(enumerated) = enumerator::rescan_single(pool, path) {
                store.update(pool, &enumerated.dir_segments, enumerated.record);
                new_record = Some(enumerated.record);
            }
        }
        ChangeKind::Deleted => {
            if let Some(full_path_id) = pool.paths.try_lookup(&crate::string_pool::normalize_path(&path.to_string_lossy())) {
                let dir = path.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
                let segs: Vec<u32> = crate::string_pool::normalize_path(&dir)
                    .split(std::path::MAIN_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| pool.names.try_lookup(s))
                    .collect();
                store.remove(pool, &segs, full_path_id);
            }
        }
        ChangeKind::Renamed => {
            if let Some(from) = &change.renamed_from {
                if let Some(full_path_id) = pool.paths.try_lookup(&crate::string_pool::normalize_path(&from.to_string_lossy())) {
                    let dir = from.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
                    let segs: Vec<u32> = crate::string_pool::normalize_path(&dir)
                        .split(std::path::MAIN_SEPARATOR)
                        .filter(|s| !s.is_empty())
                        .filter_map(|s| pool.names.try_lookup(s))
                        .collect();
                    store.remove(pool, &segs, full_path_id);
                }
            }
            if let Some(enumerated) = enumerator::rescan_single(pool, path) {
                store.update(pool, &enumerated.dir_segments, enumerated.record);
                new_record = Some(enumerated.record);
            }
        }
    }

    let event = EngineEvent::FileChanged {
        kind: change.kind,
        old_path: change.renamed_from,
        new_path: new_record.map(|_| path.to_path_buf()),
    };
    for sender in subscribers.read().iter() {
        let _ = sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_coalesces_same_path_events() {
        let mut ledger: HashMap<PathBuf, PendingChange> = HashMap::new();
        let policy = IgnorePolicy::new(&[], &[]);
        let p = PathBuf::from("/a/b.txt");
        record_event(
            &mut ledger,
            Event::new(EventKind::Create(notify::event::CreateKind::File)).add_path(p.clone()),
            &policy,
        );
        record_event(
            &mut ledger,
            Event::new(EventKind::Modify(notify::event::ModifyKind::Any)).add_path(p.clone()),
            &policy,
        );
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&p).unwrap().kind, ChangeKind::Modified);
    }

    #[test]
    fn excluded_paths_never_enter_the_ledger() {
        let mut ledger: HashMap<PathBuf, PendingChange> = HashMap::new();
        let policy = IgnorePolicy::new(&["node_modules".to_string()], &[]);
        record_event(
            &mut ledger,
            Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(PathBuf::from("/a/node_modules/x.js")),
            &policy,
        );
        assert!(ledger.is_empty());
    }
}
