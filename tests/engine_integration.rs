//! End-to-end scenarios against the public `SearchEngine` facade, covering
//! the seed tests enumerated in the specification's testable-properties
//! section: a full index-then-search pass, extension filtering, scoped
//! directory search, persistence save/load round-tripping, and live change
//! tracking via the Change Monitor.

use std::fs;
use std::path::Path;
use std::sync::mpsc::channel;
use std::time::Duration;

use fastfind::{EngineConfig, EntryAttributes, SearchEngine, SearchQuery};

fn build_tree(root: &Path, dirs: usize, files_per_dir: usize) {
    for d in 0..dirs {
        let dir = root.join(format!("sub{d}"));
        fs::create_dir(&dir).unwrap();
        for f in 0..files_per_dir {
            let name = if f == 0 {
                format!("test_file{f}.txt")
            } else {
                format!("file{f}.txt")
            };
            fs::write(dir.join(name), b"content").unwrap();
        }
    }
}

fn engine_for(root: &Path) -> SearchEngine {
    let mut config = EngineConfig::default();
    config.indexing.roots = vec![root.to_path_buf()];
    config.persistence.path = root.join("index.db");
    SearchEngine::new(config)
}

#[test]
fn indexing_a_tree_then_searching_by_name_finds_matching_files_only() {
    let tmp = tempfile::tempdir().unwrap();
    build_tree(tmp.path(), 10, 10);

    let engine = engine_for(tmp.path());
    let indexed = engine.start_indexing().unwrap();
    assert_eq!(indexed, 10 * 10 + 10, "10 dirs + 100 files");

    let result = engine
        .search(SearchQuery {
            text: Some("test".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert!(result.total > 0);
    assert_eq!(result.total, 10, "one test_file*.txt per subdirectory");
    for entry in &result.files {
        let name = engine.pool().get_name(entry.name_id);
        assert!(name.to_lowercase().contains("test"));
    }
}

#[test]
fn extension_filter_restricts_every_returned_entry() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.cs"), b"x").unwrap();
    fs::write(tmp.path().join("b.cs"), b"x").unwrap();
    fs::write(tmp.path().join("c.txt"), b"x").unwrap();

    let engine = engine_for(tmp.path());
    engine.start_indexing().unwrap();

    let result = engine
        .search(SearchQuery {
            extension_filter: Some(".cs".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(result.total, 2);
    for entry in &result.files {
        assert_eq!(engine.pool().get_name(entry.ext_id), "cs");
    }
}

#[test]
fn base_path_without_subdirectories_scopes_to_exact_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let sub1 = tmp.path().join("sub1");
    let nested = sub1.join("nested");
    fs::create_dir_all(&nested).unwrap();
    fs::write(sub1.join("a.txt"), b"x").unwrap();
    fs::write(nested.join("b.txt"), b"x").unwrap();

    let engine = engine_for(tmp.path());
    engine.start_indexing().unwrap();

    let result = engine
        .search(SearchQuery {
            base_path: Some(sub1.clone()),
            include_subdirectories: false,
            include_directories: false,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(result.total, 1);
    let dir = engine.pool().get_path(result.files[0].dir_id);
    let expected = fastfind::string_pool::normalize_path(&sub1.to_string_lossy());
    assert_eq!(dir, expected);
}

#[test]
fn refresh_drops_entries_removed_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("a").join("b");
    fs::create_dir_all(&target).unwrap();
    let file = target.join("x.txt");
    fs::write(&file, b"x").unwrap();

    let engine = engine_for(tmp.path());
    engine.start_indexing().unwrap();
    assert!(engine.statistics().total_files >= 1);

    fs::remove_file(&file).unwrap();
    engine.refresh(&[]).unwrap();

    let result = engine
        .search(SearchQuery {
            text: Some("x.txt".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(result.total, 0);
}

#[test]
fn scoped_refresh_only_touches_the_given_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a");
    let b = tmp.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    fs::write(a.join("removed.txt"), b"x").unwrap();
    fs::write(b.join("kept.txt"), b"x").unwrap();

    let engine = engine_for(tmp.path());
    engine.start_indexing().unwrap();

    fs::remove_file(a.join("removed.txt")).unwrap();
    fs::write(a.join("added.txt"), b"x").unwrap();
    engine.refresh(&[a.clone()]).unwrap();

    let removed = engine
        .search(SearchQuery {
            text: Some("removed.txt".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(removed.total, 0, "stale entry under the refreshed prefix must be gone");

    let added = engine
        .search(SearchQuery {
            text: Some("added.txt".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(added.total, 1, "new entry under the refreshed prefix must be picked up");

    let kept = engine
        .search(SearchQuery {
            text: Some("kept.txt".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(kept.total, 1, "entries outside the refreshed prefix are untouched");
}

#[test]
fn save_then_load_reproduces_the_entry_set() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("one.txt"), b"x").unwrap();
    fs::write(tmp.path().join("two.log"), b"yy").unwrap();

    let engine = engine_for(tmp.path());
    engine.start_indexing().unwrap();
    let before = engine.statistics();
    engine.save().unwrap();

    let reloaded = engine_for(tmp.path());
    let loaded = reloaded.load().unwrap();
    let after = reloaded.statistics();

    assert_eq!(loaded, before.total_files + before.total_dirs);
    assert_eq!(after.total_files, before.total_files);
    assert_eq!(after.total_bytes, before.total_bytes);
}

#[test]
fn hidden_files_are_excluded_by_default_and_included_on_request() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(".hidden"), b"x").unwrap();
    fs::write(tmp.path().join("visible.txt"), b"x").unwrap();

    let engine = engine_for(tmp.path());
    engine.start_indexing().unwrap();

    let default_result = engine.search(SearchQuery::default()).unwrap();
    assert!(default_result
        .files
        .iter()
        .all(|e| !e.attributes.contains(EntryAttributes::HIDDEN)));

    let with_hidden = engine
        .search(SearchQuery {
            include_hidden: true,
            ..Default::default()
        })
        .unwrap();
    assert!(with_hidden.total > default_result.total);
}

#[test]
fn change_monitor_picks_up_a_newly_created_file() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("seed.txt"), b"x").unwrap();

    let mut config = EngineConfig::default();
    config.indexing.roots = vec![tmp.path().to_path_buf()];
    config.indexing.enable_monitoring = true;
    config.monitor.debounce_interval_ms = 50;
    let engine = SearchEngine::new(config);

    let (tx, rx) = channel();
    engine.subscribe(tx);
    engine.start_indexing().unwrap();

    fs::write(tmp.path().join("new.txt"), b"x").unwrap();

    let mut saw_file_changed = false;
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
            if matches!(event, fastfind::EngineEvent::FileChanged { .. }) {
                saw_file_changed = true;
                break;
            }
        }
    }
    engine.stop_monitoring();
    assert!(saw_file_changed, "expected a FileChanged event within 2s");
}
