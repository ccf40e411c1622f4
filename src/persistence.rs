//! Persistence: a `rusqlite` (bundled) backed relational store with a
//! real FTS5 virtual table kept consistent by triggers. Pragmas, schema
//! versioning via `PRAGMA user_version`, and the WAL/checkpoint dance are
//! lifted close to verbatim from the teacher's own
//! `db_connection_with_timeout`/`set_indexing_pragmas`/`restore_normal_pragmas`
//! trio; schema mismatch is now a hard `SchemaMismatch` error instead of the
//! teacher's silent drop-and-recreate (see DESIGN.md).

use std::path::{Path, PathBuf};

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::PersistenceMode;
use crate::entry::EntryAttributes;
use crate::error::{EngineError, EngineResult};
use crate::ignore_policy::IgnorePolicy;
use crate::index_store::IndexStatistics;
use crate::query::SearchQuery;

const SCHEMA_VERSION: i64 = 1;

fn map_sqlite(e: rusqlite::Error) -> EngineError {
    EngineError::from(e)
}

/// Row shape mirroring `EntryRecord`, but with strings resolved (persistence
/// owns its own path/name text, independent of the in-memory String Pool).
#[derive(Debug, Clone)]
pub struct PersistedEntry {
    pub full_path: String,
    pub name: String,
    pub dir: String,
    pub ext: String,
    pub size: u64,
    pub created_utc: u64,
    pub modified_utc: u64,
    pub accessed_utc: u64,
    pub attr_bits: u8,
    pub volume: u8,
}

/// Result of [`Persistence::search`]: `has_more` is `true` when a further
/// match exists beyond `max_results`, mirroring [`crate::query::SearchResult`].
#[derive(Debug, Clone)]
pub struct PersistedSearchResult {
    pub entries: Vec<PersistedEntry>,
    pub has_more: bool,
}

/// Build the SQL fragment for the text predicate, honoring `case_sensitive`
/// and `name_only`. Regex is not expressible in SQL and is filtered in Rust
/// after the row fetch; this returns `None` when `use_regex` is set so the
/// caller skips straight to the post-filter path.
fn build_text_clause(query: &SearchQuery, use_fts: &mut bool) -> Option<(String, Box<dyn rusqlite::types::ToSql>)> {
    let text = query.text.as_ref()?;
    if text.is_empty() || query.use_regex {
        return None;
    }
    let column = if query.name_only { "e.name" } else { "e.full_path" };
    if text.contains('*') || text.contains('?') {
        if query.case_sensitive {
            Some((format!("{column} GLOB ?"), Box::new(text.clone())))
        } else {
            let like_pattern = text
                .replace('%', "\\%")
                .replace('_', "\\_")
                .replace('*', "%")
                .replace('?', "_");
            Some((format!("{column} LIKE ? ESCAPE '\\'"), Box::new(like_pattern)))
        }
    } else if query.case_sensitive {
        Some((format!("{column} GLOB ?"), Box::new(format!("*{text}*"))))
    } else if query.name_only {
        *use_fts = true;
        Some(("entries_fts MATCH ?".to_string(), Box::new(format!("{text}*"))))
    } else {
        Some((format!("{column} LIKE ?"), Box::new(format!("%{text}%"))))
    }
}

fn open_with_pragmas(path: &Path, busy_timeout_ms: u32) -> EngineResult<Connection> {
    log::debug!("persistence: opening {} (busy_timeout={busy_timeout_ms}ms)", path.display());
    let conn = Connection::open(path).map_err(map_sqlite)?;
    conn.execute_batch(&format!(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA temp_store=MEMORY;
        PRAGMA busy_timeout={busy_timeout_ms};
        "#
    ))
    .map_err(map_sqlite)?;
    Ok(conn)
}

fn set_indexing_pragmas(conn: &Connection) -> EngineResult<()> {
    log::debug!("persistence: switching to high-performance indexing pragmas");
    conn.execute_batch(
        r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = -65536;
        PRAGMA mmap_size = 268435456;
        PRAGMA wal_autocheckpoint = 0;
        "#,
    )
    .map_err(map_sqlite)
}

fn restore_normal_pragmas(conn: &Connection) -> EngineResult<()> {
    log::debug!("persistence: restoring steady-state pragmas and checkpointing WAL");
    conn.execute_batch(
        r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = -16384;
        PRAGMA wal_autocheckpoint = 1000;
        "#,
    )
    .map_err(map_sqlite)?;
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .map_err(map_sqlite)
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
  full_path TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  dir TEXT NOT NULL,
  ext TEXT NOT NULL DEFAULT '',
  size INTEGER NOT NULL,
  created INTEGER NOT NULL,
  modified INTEGER NOT NULL,
  accessed INTEGER NOT NULL,
  attr_bits INTEGER NOT NULL,
  volume INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_dir ON entries(dir);
CREATE INDEX IF NOT EXISTS idx_entries_ext ON entries(ext);
CREATE INDEX IF NOT EXISTS idx_entries_name_nocase ON entries(name COLLATE NOCASE);

CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
  name,
  full_path UNINDEXED,
  content='entries',
  content_rowid='rowid'
);

CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);
"#;

const TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS entries_ai AFTER INSERT ON entries BEGIN
  INSERT INTO entries_fts(rowid, name, full_path) VALUES (new.rowid, new.name, new.full_path);
END;
CREATE TRIGGER IF NOT EXISTS entries_ad AFTER DELETE ON entries BEGIN
  INSERT INTO entries_fts(entries_fts, rowid, name, full_path) VALUES ('delete', old.rowid, old.name, old.full_path);
END;
CREATE TRIGGER IF NOT EXISTS entries_au AFTER UPDATE ON entries BEGIN
  INSERT INTO entries_fts(entries_fts, rowid, name, full_path) VALUES ('delete', old.rowid, old.name, old.full_path);
  INSERT INTO entries_fts(rowid, name, full_path) VALUES (new.rowid, new.name, new.full_path);
END;
"#;

const DROP_TRIGGERS_SQL: &str = r#"
DROP TRIGGER IF EXISTS entries_ai;
DROP TRIGGER IF EXISTS entries_ad;
DROP TRIGGER IF EXISTS entries_au;
"#;

/// The on-disk store. One writer connection, serialized through `&mut self`
/// for mutation; `search` opens a short-lived read path over the same
/// connection (SQLite's own WAL readers/writers concurrency covers the rest).
pub struct Persistence {
    conn: Connection,
    mode: PersistenceMode,
    fts_bulk_threshold: usize,
}

impl Persistence {
    /// Idempotent: creates schema/pragmas if missing. A version mismatch in
    /// `PRAGMA user_version` against an already-initialized file is a hard
    /// `SchemaMismatch`, not a silent drop-and-recreate.
    pub fn init(path: &Path, mode: PersistenceMode, fts_bulk_threshold: usize) -> EngineResult<Self> {
        let conn = open_with_pragmas(path, 3000)?;
        let on_disk: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .map_err(map_sqlite)?;
        if on_disk == 0 {
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
                .map_err(map_sqlite)?;
        } else if on_disk != SCHEMA_VERSION {
            return Err(EngineError::SchemaMismatch {
                on_disk,
                expected: SCHEMA_VERSION,
            });
        }
        conn.execute_batch(SCHEMA_SQL).map_err(map_sqlite)?;
        conn.execute_batch(TRIGGERS_SQL).map_err(map_sqlite)?;
        if mode == PersistenceMode::HighPerformance {
            set_indexing_pragmas(&conn)?;
        }
        Ok(Persistence {
            conn,
            mode,
            fts_bulk_threshold,
        })
    }

    pub fn add(&mut self, entry: &PersistedEntry) -> EngineResult<()> {
        self.conn
            .execute(
                "INSERT INTO entries(full_path, name, dir, ext, size, created, modified, accessed, attr_bits, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.full_path,
                    entry.name,
                    entry.dir,
                    entry.ext,
                    entry.size as i64,
                    entry.created_utc as i64,
                    entry.modified_utc as i64,
                    entry.accessed_utc as i64,
                    entry.attr_bits,
                    entry.volume,
                ],
            )
            .map_err(map_sqlite)?;
        Ok(())
    }

    /// Bulk load: above `fts_bulk_threshold` rows, triggers are dropped for
    /// the duration of the insert and the FTS index is rebuilt with a single
    /// `INSERT ... SELECT`, all inside one transaction so a reader never
    /// observes a partially-indexed state.
    pub fn add_batch(&mut self, entries: &[PersistedEntry]) -> EngineResult<usize> {
        let bulk = entries.len() >= self.fts_bulk_threshold;
        log::debug!("persistence: beginning transaction for batch of {} row(s)", entries.len());
        let tx = self.conn.transaction().map_err(map_sqlite)?;
        if bulk {
            log::debug!("persistence: bulk load, dropping fts triggers for the duration of the insert");
            tx.execute_batch(DROP_TRIGGERS_SQL).map_err(map_sqlite)?;
        }
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO entries(full_path, name, dir, ext, size, created, modified, accessed, attr_bits, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(map_sqlite)?;
            for entry in entries {
                stmt.execute(params![
                    entry.full_path,
                    entry.name,
                    entry.dir,
                    entry.ext,
                    entry.size as i64,
                    entry.created_utc as i64,
                    entry.modified_utc as i64,
                    entry.accessed_utc as i64,
                    entry.attr_bits,
                    entry.volume,
                ])
                .map_err(map_sqlite)?;
            }
        }
        if bulk {
            log::debug!("persistence: rebuilding fts5 index after bulk load");
            tx.execute_batch("INSERT INTO entries_fts(entries_fts) VALUES('rebuild');")
                .map_err(map_sqlite)?;
            tx.execute_batch(TRIGGERS_SQL).map_err(map_sqlite)?;
        }
        tx.commit().map_err(map_sqlite)?;
        log::debug!("persistence: committed batch of {} row(s)", entries.len());
        Ok(entries.len())
    }

    pub fn update(&mut self, entry: &PersistedEntry) -> EngineResult<()> {
        self.remove(&entry.full_path)?;
        self.add(entry)
    }

    pub fn remove(&mut self, full_path: &str) -> EngineResult<bool> {
        let n = self
            .conn
            .execute("DELETE FROM entries WHERE full_path = ?1", params![full_path])
            .map_err(map_sqlite)?;
        Ok(n > 0)
    }

    pub fn remove_batch(&mut self, full_paths: &[String]) -> EngineResult<usize> {
        let tx = self.conn.transaction().map_err(map_sqlite)?;
        let mut removed = 0usize;
        {
            let mut stmt = tx
                .prepare("DELETE FROM entries WHERE full_path = ?1")
                .map_err(map_sqlite)?;
            for path in full_paths {
                removed += stmt.execute(params![path]).map_err(map_sqlite)?;
            }
        }
        tx.commit().map_err(map_sqlite)?;
        Ok(removed)
    }

    pub fn get(&self, full_path: &str) -> EngineResult<Option<PersistedEntry>> {
        self.conn
            .query_row(
                "SELECT full_path, name, dir, ext, size, created, modified, accessed, attr_bits, volume
                 FROM entries WHERE full_path = ?1",
                params![full_path],
                row_to_entry,
            )
            .optional()
            .map_err(map_sqlite)
    }

    pub fn exists(&self, full_path: &str) -> EngineResult<bool> {
        Ok(self.get(full_path)?.is_some())
    }

    pub fn clear(&mut self) -> EngineResult<()> {
        self.conn.execute_batch("DELETE FROM entries;").map_err(map_sqlite)
    }

    pub fn count(&self) -> EngineResult<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM entries", [], |r| r.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(map_sqlite)
    }

    /// Predicate surface equivalent to [`crate::query::CompiledQuery`]:
    /// everything expressible in SQL runs there; `excluded_paths` and
    /// `use_regex` are applied as a post-filter in Rust since SQLite has no
    /// native regex or prefix/segment matcher, then `max_results` is
    /// enforced with the same precise `has_more` semantics as the in-memory
    /// evaluator.
    pub fn search(&self, query: &SearchQuery) -> EngineResult<PersistedSearchResult> {
        let mut sql = String::from(
            "SELECT e.full_path, e.name, e.dir, e.ext, e.size, e.created, e.modified, e.accessed, e.attr_bits, e.volume FROM entries e",
        );
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut use_fts = false;

        let regex_filter = if query.use_regex {
            match &query.text {
                Some(t) if !t.is_empty() => {
                    let pattern = if query.case_sensitive { t.clone() } else { format!("(?i){t}") };
                    Some(Regex::new(&pattern).map_err(|e| EngineError::InvalidInput(e.to_string()))?)
                }
                _ => None,
            }
        } else {
            None
        };

        if let Some((clause, arg)) = build_text_clause(query, &mut use_fts) {
            clauses.push(clause);
            args.push(arg);
        }
        if use_fts {
            sql.push_str(" JOIN entries_fts f ON f.rowid = e.rowid");
        }

        if query.base_path.is_some() || !query.search_locations.is_empty() {
            let mut scopes: Vec<String> = query
                .search_locations
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect();
            if let Some(base) = &query.base_path {
                scopes.push(base.to_string_lossy().to_string());
            }
            let mut scope_clauses = Vec::new();
            for scope in scopes {
                if query.include_subdirectories {
                    scope_clauses.push("(e.dir = ? OR e.dir LIKE ?)".to_string());
                    args.push(Box::new(scope.clone()));
                    args.push(Box::new(format!("{scope}{}%", std::path::MAIN_SEPARATOR)));
                } else {
                    scope_clauses.push("e.dir = ?".to_string());
                    args.push(Box::new(scope));
                }
            }
            clauses.push(format!("({})", scope_clauses.join(" OR ")));
        }
        if let Some(ext) = &query.extension_filter {
            clauses.push("e.ext = ?".to_string());
            args.push(Box::new(ext.trim_start_matches('.').to_lowercase()));
        }
        if !query.include_directories {
            clauses.push(format!("(e.attr_bits & {}) = 0", EntryAttributes::DIRECTORY.bits()));
        }
        if !query.include_files {
            clauses.push(format!("(e.attr_bits & {}) != 0", EntryAttributes::DIRECTORY.bits()));
        }
        if !query.include_hidden {
            clauses.push(format!("(e.attr_bits & {}) = 0", EntryAttributes::HIDDEN.bits()));
        }
        if !query.include_system {
            clauses.push(format!("(e.attr_bits & {}) = 0", EntryAttributes::SYSTEM.bits()));
        }
        if let Some(min) = query.size_min {
            clauses.push("e.size >= ?".to_string());
            args.push(Box::new(min as i64));
        }
        if let Some(max) = query.size_max {
            clauses.push("e.size <= ?".to_string());
            args.push(Box::new(max as i64));
        }
        if let Some(after) = query.created_after {
            clauses.push("e.created >= ?".to_string());
            args.push(Box::new(after as i64));
        }
        if let Some(before) = query.created_before {
            clauses.push("e.created <= ?".to_string());
            args.push(Box::new(before as i64));
        }
        if let Some(after) = query.modified_after {
            clauses.push("e.modified >= ?".to_string());
            args.push(Box::new(after as i64));
        }
        if let Some(before) = query.modified_before {
            clauses.push("e.modified <= ?".to_string());
            args.push(Box::new(before as i64));
        }
        if !query.required_attributes.is_empty() {
            let bits = query.required_attributes.bits();
            clauses.push(format!("(e.attr_bits & {bits}) = {bits}"));
        }
        if !query.excluded_attributes.is_empty() {
            clauses.push(format!("(e.attr_bits & {}) = 0", query.excluded_attributes.bits()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        // excluded_paths and regex can only be applied after the fetch, so a
        // SQL LIMIT would cut the candidate set before those filters run.
        let needs_post_filter = !query.excluded_paths.is_empty() || regex_filter.is_some();
        if !needs_post_filter {
            if let Some(limit) = query.max_results {
                sql.push_str(&format!(" LIMIT {}", limit + 1));
            }
        }

        let mut stmt = self.conn.prepare(&sql).map_err(map_sqlite)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_entry).map_err(map_sqlite)?;
        let mut candidates = Vec::new();
        for row in rows {
            candidates.push(row.map_err(map_sqlite)?);
        }

        let excluded = IgnorePolicy::new(&query.excluded_paths, &[]);
        let mut entries = Vec::new();
        let mut has_more = false;
        for entry in candidates {
            if !query.excluded_paths.is_empty() && excluded.is_path_excluded(Path::new(&entry.full_path)) {
                continue;
            }
            if let Some(re) = &regex_filter {
                let haystack = if query.name_only { &entry.name } else { &entry.full_path };
                if !re.is_match(haystack) {
                    continue;
                }
            }
            match query.max_results {
                Some(limit) if entries.len() >= limit => {
                    has_more = true;
                    break;
                }
                _ => entries.push(entry),
            }
        }

        Ok(PersistedSearchResult { entries, has_more })
    }

    /// Begin an explicit transaction. Disposing the returned [`PersistedTransaction`]
    /// without calling `commit` rolls back, matching rusqlite's own `Drop`
    /// behavior and spec §4.8's "dispose without commit = rollback".
    pub fn begin_transaction(&mut self) -> EngineResult<PersistedTransaction<'_>> {
        log::debug!("persistence: beginning explicit transaction");
        let tx = self.conn.transaction().map_err(map_sqlite)?;
        Ok(PersistedTransaction { tx })
    }

    pub fn vacuum(&mut self) -> EngineResult<()> {
        self.conn.execute_batch("VACUUM;").map_err(map_sqlite)
    }

    pub fn statistics(&self) -> EngineResult<IndexStatistics> {
        let mut stats = IndexStatistics::default();
        let (files, dirs, bytes): (i64, i64, i64) = self
            .conn
            .query_row(
                &format!(
                    "SELECT
                        SUM(CASE WHEN (attr_bits & {dir_bit}) = 0 THEN 1 ELSE 0 END),
                        SUM(CASE WHEN (attr_bits & {dir_bit}) != 0 THEN 1 ELSE 0 END),
                        SUM(CASE WHEN (attr_bits & {dir_bit}) = 0 THEN size ELSE 0 END)
                     FROM entries",
                    dir_bit = EntryAttributes::DIRECTORY.bits()
                ),
                [],
                |r| {
                    Ok((
                        r.get::<_, Option<i64>>(0)?.unwrap_or(0),
                        r.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        r.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    ))
                },
            )
            .map_err(map_sqlite)?;
        stats.total_files = files as u64;
        stats.total_dirs = dirs as u64;
        stats.total_bytes = bytes as u64;

        let mut stmt = self
            .conn
            .prepare("SELECT ext, COUNT(*) FROM entries WHERE ext != '' GROUP BY ext")
            .map_err(map_sqlite)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))
            .map_err(map_sqlite)?;
        for row in rows {
            let (ext, count) = row.map_err(map_sqlite)?;
            stats.extensions.insert(ext, count);
        }
        Ok(stats)
    }

    /// Checkpoint the WAL and restore steady-state pragmas (the high-
    /// performance indexing pragmas are only appropriate during a bulk load).
    pub fn optimize(&mut self) -> EngineResult<()> {
        restore_normal_pragmas(&self.conn)
    }

    pub fn path(&self) -> EngineResult<PathBuf> {
        self.conn
            .query_row("PRAGMA database_list", [], |r| r.get::<_, String>(2))
            .map(PathBuf::from)
            .map_err(map_sqlite)
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<PersistedEntry> {
    Ok(PersistedEntry {
        full_path: row.get(0)?,
        name: row.get(1)?,
        dir: row.get(2)?,
        ext: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
        created_utc: row.get::<_, i64>(5)? as u64,
        modified_utc: row.get::<_, i64>(6)? as u64,
        accessed_utc: row.get::<_, i64>(7)? as u64,
        attr_bits: row.get(8)?,
        volume: row.get(9)?,
    })
}

/// An in-progress transaction. `Drop` without `commit()` rolls back.
pub struct PersistedTransaction<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl<'conn> PersistedTransaction<'conn> {
    pub fn add(&self, entry: &PersistedEntry) -> EngineResult<()> {
        self.tx
            .execute(
                "INSERT INTO entries(full_path, name, dir, ext, size, created, modified, accessed, attr_bits, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.full_path,
                    entry.name,
                    entry.dir,
                    entry.ext,
                    entry.size as i64,
                    entry.created_utc as i64,
                    entry.modified_utc as i64,
                    entry.accessed_utc as i64,
                    entry.attr_bits,
                    entry.volume,
                ],
            )
            .map_err(map_sqlite)?;
        Ok(())
    }

    pub fn count(&self) -> EngineResult<u64> {
        self.tx
            .query_row("SELECT COUNT(*) FROM entries", [], |r| r.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(map_sqlite)
    }

    pub fn commit(self) -> EngineResult<()> {
        log::debug!("persistence: committing transaction");
        self.tx.commit().map_err(map_sqlite)
    }

    pub fn rollback(self) -> EngineResult<()> {
        log::warn!("persistence: rolling back transaction");
        self.tx.rollback().map_err(map_sqlite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str) -> PersistedEntry {
        PersistedEntry {
            full_path: path.to_string(),
            name: std::path::Path::new(path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string(),
            dir: std::path::Path::new(path)
                .parent()
                .unwrap()
                .to_string_lossy()
                .to_string(),
            ext: "txt".to_string(),
            size: 10,
            created_utc: 0,
            modified_utc: 0,
            accessed_utc: 0,
            attr_bits: 0,
            volume: b'/',
        }
    }

    #[test]
    fn init_is_idempotent_and_add_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("idx.db");
        let mut p = Persistence::init(&db_path, PersistenceMode::Safe, 500).unwrap();
        p.add(&sample("/a/b.txt")).unwrap();
        assert_eq!(p.count().unwrap(), 1);
        drop(p);
        let p2 = Persistence::init(&db_path, PersistenceMode::Safe, 500).unwrap();
        assert_eq!(p2.count().unwrap(), 1);
        assert!(p2.exists("/a/b.txt").unwrap());
    }

    #[test]
    fn rollback_reverts_count_to_pre_transaction() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 500).unwrap();
        p.add(&sample("/a/existing.txt")).unwrap();
        let before = p.count().unwrap();
        {
            let tx = p.begin_transaction().unwrap();
            tx.add(&sample("/a/one.txt")).unwrap();
            tx.add(&sample("/a/two.txt")).unwrap();
            tx.add(&sample("/a/three.txt")).unwrap();
            tx.rollback().unwrap();
        }
        assert_eq!(p.count().unwrap(), before);
        assert!(!p.exists("/a/one.txt").unwrap());
    }

    #[test]
    fn fts_consistency_after_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 500).unwrap();
        p.add(&sample("/a/unique_name_token.txt")).unwrap();
        let hits: i64 = p
            .conn
            .query_row(
                "SELECT COUNT(*) FROM entries_fts WHERE entries_fts MATCH 'unique_name_token*'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
        p.remove("/a/unique_name_token.txt").unwrap();
        let hits_after: i64 = p
            .conn
            .query_row(
                "SELECT COUNT(*) FROM entries_fts WHERE entries_fts MATCH 'unique_name_token*'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits_after, 0);
    }

    #[test]
    fn schema_mismatch_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("idx.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch("PRAGMA user_version = 999;").unwrap();
        }
        let err = Persistence::init(&db_path, PersistenceMode::Safe, 500).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { on_disk: 999, .. }));
    }

    #[test]
    fn bulk_add_batch_rebuilds_fts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 2).unwrap();
        let rows: Vec<PersistedEntry> = (0..5).map(|i| sample(&format!("/a/file{i}.txt"))).collect();
        p.add_batch(&rows).unwrap();
        assert_eq!(p.count().unwrap(), 5);
        let hits: i64 = p
            .conn
            .query_row(
                "SELECT COUNT(*) FROM entries_fts WHERE entries_fts MATCH 'file2*'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }

    #[test]
    fn search_max_results_truncates_and_reports_has_more() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 500).unwrap();
        for i in 0..5 {
            p.add(&sample(&format!("/a/file{i}.txt"))).unwrap();
        }
        let result = p
            .search(&SearchQuery {
                max_results: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.entries.len(), 3);
        assert!(result.has_more);

        let result = p
            .search(&SearchQuery {
                max_results: Some(10),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.entries.len(), 5);
        assert!(!result.has_more);
    }

    #[test]
    fn search_honors_case_sensitive_text_predicate() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 500).unwrap();
        p.add(&sample("/a/Report.txt")).unwrap();
        p.add(&sample("/a/report.txt")).unwrap();

        let insensitive = p
            .search(&SearchQuery {
                text: Some("report".to_string()),
                name_only: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(insensitive.entries.len(), 2);

        let sensitive = p
            .search(&SearchQuery {
                text: Some("report".to_string()),
                name_only: true,
                case_sensitive: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sensitive.entries.len(), 1);
        assert_eq!(sensitive.entries[0].name, "report.txt");
    }

    #[test]
    fn search_excludes_paths_as_a_post_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 500).unwrap();
        p.add(&sample("/a/node_modules/pkg.js")).unwrap();
        p.add(&sample("/a/src/main.js")).unwrap();

        let result = p
            .search(&SearchQuery {
                excluded_paths: vec!["node_modules".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].name, "main.js");
    }

    #[test]
    fn search_filters_by_required_attributes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 500).unwrap();
        let mut hidden = sample("/a/.secret.txt");
        hidden.attr_bits = EntryAttributes::HIDDEN.bits();
        p.add(&hidden).unwrap();
        p.add(&sample("/a/visible.txt")).unwrap();

        let result = p
            .search(&SearchQuery {
                required_attributes: EntryAttributes::HIDDEN,
                include_hidden: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].name, ".secret.txt");
    }

    #[test]
    fn search_scope_does_not_match_sibling_with_shared_characters() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = Persistence::init(&tmp.path().join("idx.db"), PersistenceMode::Safe, 500).unwrap();
        p.add(&sample("/home/user/notes.txt")).unwrap();
        p.add(&sample("/home/user2/notes.txt")).unwrap();

        let result = p
            .search(&SearchQuery {
                search_locations: vec![PathBuf::from("/home/user")],
                include_subdirectories: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].dir, "/home/user");
    }
}
