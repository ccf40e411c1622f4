//! Platform Enumerator: parallel-BFS directory traversal with shallow
//! dispatch (spec §4.4). A fixed worker pool reads each directory with one OS
//! call, dispatching subdirectories found at depth <= 2 back onto a shared
//! work queue and recursing inline on deeper ones so the queue only ever
//! holds the wide top of the tree while deep subtrees stay cache-local to one
//! worker. Records stream out through a bounded channel that blocks the
//! workers once full (back-pressure), mirroring the `std::sync::mpsc`
//! channel shape the teacher already uses for its FSEvents bridge.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{unbounded, Receiver as WorkReceiver, Sender as WorkSender};

use crate::cancellation::CancellationToken;
use crate::config::IndexingOptions;
use crate::entry::{EntryAttributes, EntryRecord};
use crate::ignore_policy::IgnorePolicy;
use crate::string_pool::StringPool;

const CHANNEL_CAPACITY: usize = 1_500;
const IDLE_POLL: Duration = Duration::from_millis(100);

/// One enumerated record plus the interned directory-segment path needed to
/// insert it into the [`crate::path_trie::PathTrie`].
pub struct EnumeratedEntry {
    pub record: EntryRecord,
    pub dir_segments: Vec<u32>,
}

struct WorkItem {
    path: PathBuf,
    depth: usize,
}

/// Handle to a running enumeration: a receiver of [`EnumeratedEntry`] plus a
/// join point for the worker pool.
pub struct EnumerationHandle {
    pub entries: Receiver<EnumeratedEntry>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl EnumerationHandle {
    /// Block until every worker has exited (the traversal has completed or
    /// been cancelled).
    pub fn join(self) {
        for w in self.workers {
            let _ = w.join();
        }
    }
}

fn to_epoch_secs(t: std::io::Result<SystemTime>) -> u64 {
    t.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn volume_tag_for(path: &Path) -> u8 {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path)
        .map(|m| (m.dev() % 26) as u8 + b'A')
        .unwrap_or(b'/')
}

#[cfg(not(unix))]
fn volume_tag_for(path: &Path) -> u8 {
    path.components()
        .next()
        .and_then(|c| c.as_os_str().to_str())
        .and_then(|s| s.bytes().next())
        .unwrap_or(b'C')
}

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Spawn the worker pool and begin streaming entries rooted at `roots`.
pub fn spawn(
    roots: Vec<PathBuf>,
    options: IndexingOptions,
    pool: Arc<StringPool>,
    cancel: CancellationToken,
) -> EnumerationHandle {
    let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
    let (work_tx, work_rx) = unbounded::<WorkItem>();
    let pending = Arc::new(AtomicIsize::new(roots.len() as isize));
    let policy = Arc::new(IgnorePolicy::new(
        &options.excluded_paths,
        &options.excluded_extensions,
    ));
    let options = Arc::new(options);

    for root in roots {
        let _ = work_tx.send(WorkItem { path: root, depth: 0 });
    }

    let n_workers = options.parallel_threads.max(1);
    let mut workers = Vec::with_capacity(n_workers);
    for _ in 0..n_workers {
        let work_tx = work_tx.clone();
        let work_rx = work_rx.clone();
        let tx = tx.clone();
        let pending = Arc::clone(&pending);
        let pool = Arc::clone(&pool);
        let policy = Arc::clone(&policy);
        let options = Arc::clone(&options);
        let cancel = cancel.clone();
        workers.push(std::thread::spawn(move || {
            worker_loop(work_tx, work_rx, tx, pending, pool, policy, options, cancel);
        }));
    }
    drop(work_tx);
    drop(tx);

    EnumerationHandle { entries: rx, workers }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    work_tx: WorkSender<WorkItem>,
    work_rx: WorkReceiver<WorkItem>,
    out: SyncSender<EnumeratedEntry>,
    pending: Arc<AtomicIsize>,
    pool: Arc<StringPool>,
    policy: Arc<IgnorePolicy>,
    options: Arc<IndexingOptions>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        match work_rx.recv_timeout(IDLE_POLL) {
            Ok(item) => {
                process_dir(&item.path, item.depth, &work_tx, &out, &pending, &pool, &policy, &options, &cancel);
                if pending.fetch_sub(1, Ordering::SeqCst) - 1 <= 0 {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if pending.load(Ordering::SeqCst) <= 0 {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Process one directory: a single `read_dir` call, emitting file records and
/// either dispatching or recursing on subdirectories. Returns normally on any
/// per-directory IO error after logging it — traversal never aborts.
#[allow(clippy::too_many_arguments)]
fn process_dir(
    dir: &Path,
    depth: usize,
    work_tx: &WorkSender<WorkItem>,
    out: &SyncSender<EnumeratedEntry>,
    pending: &Arc<AtomicIsize>,
    pool: &StringPool,
    policy: &IgnorePolicy,
    options: &IndexingOptions,
    cancel: &CancellationToken,
) {
    if let Some(max_depth) = options.max_depth {
        if depth > max_depth {
            return;
        }
    }

    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            log::warn!("enumerator: skipping {}: {e}", dir.display());
            return;
        }
    };

    for entry in read_dir {
        if cancel.is_cancelled() {
            return;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("enumerator: entry error under {}: {e}", dir.display());
                continue;
            }
        };
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if policy.is_path_excluded(&path) {
            continue;
        }

        let symlink_meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("enumerator: stat error for {}: {e}", path.display());
                continue;
            }
        };
        let is_symlink = symlink_meta.file_type().is_symlink();
        if is_symlink && !options.follow_symlinks {
            continue;
        }
        let metadata = if is_symlink {
            match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("enumerator: broken symlink {}: {e}", path.display());
                    continue;
                }
            }
        } else {
            symlink_meta
        };

        let is_dir = metadata.is_dir();

        if is_dir && IgnorePolicy::is_virtual_filesystem(&name) {
            continue;
        }

        if !is_dir {
            if let Some(max_size) = options.max_file_size {
                if metadata.len() > max_size {
                    continue;
                }
            }
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            if !ext.is_empty() && policy.is_extension_excluded(&ext) {
                continue;
            }
        }

        if let Some(record) = build_record(pool, &path, &name, is_dir, is_symlink, &metadata) {
            let dir_str = dir.to_string_lossy().to_string();
            let dir_segments = segments_of(pool, &dir_str);
            if out.send(EnumeratedEntry { record, dir_segments }).is_err() {
                return;
            }
        }

        if is_dir {
            if depth <= 2 {
                pending.fetch_add(1, Ordering::SeqCst);
                if work_tx.send(WorkItem { path, depth: depth + 1 }).is_err() {
                    pending.fetch_sub(1, Ordering::SeqCst);
                }
            } else {
                process_dir(&path, depth + 1, work_tx, out, pending, pool, policy, options, cancel);
            }
        }
    }
}

fn segments_of(pool: &StringPool, dir: &str) -> Vec<u32> {
    crate::string_pool::normalize_path(dir)
        .split(std::path::MAIN_SEPARATOR)
        .filter(|s| !s.is_empty())
        .filter_map(|s| pool.intern_name(s).ok())
        .collect()
}

fn build_record(
    pool: &StringPool,
    path: &Path,
    name: &str,
    is_dir: bool,
    is_symlink: bool,
    metadata: &std::fs::Metadata,
) -> Option<EntryRecord> {
    let full_path_id = pool.intern_path(&path.to_string_lossy()).ok()?;
    let name_id = pool.intern_name(name).ok()?;
    let dir_id = path
        .parent()
        .map(|p| pool.intern_path(&p.to_string_lossy()).unwrap_or(0))
        .unwrap_or(0);
    let ext_id = if is_dir {
        0
    } else {
        path.extension()
            .map(|e| pool.intern_name(&e.to_string_lossy()).unwrap_or(0))
            .unwrap_or(0)
    };

    let mut attrs = EntryAttributes::empty();
    if is_dir {
        attrs |= EntryAttributes::DIRECTORY;
    }
    if is_hidden_name(name) {
        attrs |= EntryAttributes::HIDDEN;
    }
    if is_symlink {
        attrs |= EntryAttributes::SYMLINK;
    }
    if metadata.permissions().readonly() {
        attrs |= EntryAttributes::READ_ONLY;
    }

    Some(EntryRecord::new(
        full_path_id,
        name_id,
        dir_id,
        ext_id,
        if is_dir { 0 } else { metadata.len() },
        to_epoch_secs(metadata.created()),
        to_epoch_secs(metadata.modified()),
        to_epoch_secs(metadata.accessed()),
        attrs,
        volume_tag_for(path),
    ))
}

/// Single-path rescan used by the Change Monitor to refresh metadata for one
/// path without walking its whole subtree. Built on `walkdir` with depth 0
/// (the teacher's own traversal crate, used here for its single-entry
/// `DirEntry` metadata API rather than jwalk's parallel-dispatch machinery,
/// which the bulk indexing path above already replaces with a hand-rolled
/// worker pool).
pub fn rescan_single(pool: &StringPool, path: &Path) -> Option<EnumeratedEntry> {
    let mut walker = walkdir::WalkDir::new(path).min_depth(0).max_depth(0).into_iter();
    let entry = walker.next()?.ok()?;
    let metadata = entry.metadata().ok()?;
    let name = entry.file_name().to_string_lossy().to_string();
    let is_symlink = entry.path_is_symlink();
    let is_dir = metadata.is_dir();
    let record = build_record(pool, entry.path(), &name, is_dir, is_symlink, &metadata)?;
    let dir_str = entry.path().parent()?.to_string_lossy().to_string();
    Some(EnumeratedEntry {
        record,
        dir_segments: segments_of(pool, &dir_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_a_small_tree_and_respects_cancellation() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::create_dir(tmp.path().join(format!("dir{i}"))).unwrap();
            fs::write(tmp.path().join(format!("dir{i}/file.txt")), b"x").unwrap();
        }
        let pool = Arc::new(StringPool::new());
        let mut opts = IndexingOptions::default();
        opts.parallel_threads = 2;
        let handle = spawn(vec![tmp.path().to_path_buf()], opts, Arc::clone(&pool), CancellationToken::new());
        let mut count = 0;
        while handle.entries.recv().is_ok() {
            count += 1;
        }
        handle.join();
        // 5 directories + 5 files
        assert_eq!(count, 10);
    }

    #[test]
    fn excluded_path_segment_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("node_modules")).unwrap();
        fs::write(tmp.path().join("node_modules/pkg.json"), b"{}").unwrap();
        fs::write(tmp.path().join("keep.txt"), b"x").unwrap();
        let pool = Arc::new(StringPool::new());
        let mut opts = IndexingOptions::default();
        opts.excluded_paths = vec!["node_modules".to_string()];
        let handle = spawn(vec![tmp.path().to_path_buf()], opts, Arc::clone(&pool), CancellationToken::new());
        let mut names = Vec::new();
        while let Ok(e) = handle.entries.recv() {
            names.push(pool.get_name(e.record.name_id));
        }
        handle.join();
        assert!(!names.iter().any(|n| n == "pkg.json"));
        assert!(names.iter().any(|n| n == "keep.txt"));
    }
}
