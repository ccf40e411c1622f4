//! Query evaluator: compiles a [`SearchQuery`] into a [`CompiledQuery`]
//! once, then streams matches over the Index Store or a resolved Path Trie
//! subtree. `SearchQuery` is the full explicit struct enumerated in spec §3 —
//! a typed generalization of the teacher's stringly-typed `SearchMode`/
//! `sort_by: &str` pair in the original `query.rs`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::cancellation::CancellationToken;
use crate::entry::{EntryAttributes, EntryRecord};
use crate::error::{EngineError, EngineResult};
use crate::ignore_policy::IgnorePolicy;
use crate::index_store::IndexStore;
use crate::matcher::{contains_vectorized, matches_wildcard, MatcherStats};
use crate::string_pool::{normalize_path, StringPool};

/// The closed set of predicate options a caller may set; every field is
/// optional or defaulted per spec §3.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub case_sensitive: bool,
    pub use_regex: bool,
    pub name_only: bool,
    pub base_path: Option<PathBuf>,
    pub include_subdirectories: bool,
    pub extension_filter: Option<String>,
    pub include_files: bool,
    pub include_directories: bool,
    pub include_hidden: bool,
    pub include_system: bool,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
    pub created_after: Option<u64>,
    pub created_before: Option<u64>,
    pub modified_after: Option<u64>,
    pub modified_before: Option<u64>,
    pub required_attributes: EntryAttributes,
    pub excluded_attributes: EntryAttributes,
    pub search_locations: Vec<PathBuf>,
    pub excluded_paths: Vec<String>,
    pub max_results: Option<usize>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            text: None,
            case_sensitive: false,
            use_regex: false,
            name_only: false,
            base_path: None,
            include_subdirectories: true,
            extension_filter: None,
            include_files: true,
            include_directories: true,
            include_hidden: false,
            include_system: false,
            size_min: None,
            size_max: None,
            created_after: None,
            created_before: None,
            modified_after: None,
            modified_before: None,
            required_attributes: EntryAttributes::empty(),
            excluded_attributes: EntryAttributes::empty(),
            search_locations: Vec::new(),
            excluded_paths: Vec::new(),
            max_results: None,
        }
    }
}

#[derive(Debug)]
enum TextPredicate {
    None,
    Substring(String),
    Wildcard(String),
    Regex(Regex),
}

/// The compiled, validated form of a [`SearchQuery`]. Built once per search;
/// the predicate stack below runs cheap filters first per spec §4.6.
pub struct CompiledQuery {
    query: SearchQuery,
    text: TextPredicate,
    scope_segments: Option<Vec<Vec<u32>>>,
    excluded: IgnorePolicy,
}

fn validate_ranges(q: &SearchQuery) -> EngineResult<()> {
    if let (Some(min), Some(max)) = (q.size_min, q.size_max) {
        if min > max {
            return Err(EngineError::InvalidInput(format!(
                "size_min ({min}) > size_max ({max})"
            )));
        }
    }
    if let (Some(a), Some(b)) = (q.created_after, q.created_before) {
        if a > b {
            return Err(EngineError::InvalidInput(
                "created_after is later than created_before".into(),
            ));
        }
    }
    if let (Some(a), Some(b)) = (q.modified_after, q.modified_before) {
        if a > b {
            return Err(EngineError::InvalidInput(
                "modified_after is later than modified_before".into(),
            ));
        }
    }
    Ok(())
}

/// Compile `query` against `pool` (needed to resolve `base_path`/
/// `search_locations` into trie segment paths). Invalid regex or
/// contradictory ranges are rejected here, before any iteration starts.
pub fn compile(query: SearchQuery, pool: &StringPool) -> EngineResult<CompiledQuery> {
    validate_ranges(&query)?;

    let text = match &query.text {
        None => TextPredicate::None,
        Some(t) if t.is_empty() => TextPredicate::None,
        Some(t) if query.use_regex => {
            let re = if query.case_sensitive {
                Regex::new(t)?
            } else {
                Regex::new(&format!("(?i){t}"))?
            };
            TextPredicate::Regex(re)
        }
        Some(t) if t.contains('*') || t.contains('?') => TextPredicate::Wildcard(t.clone()),
        Some(t) => TextPredicate::Substring(t.clone()),
    };

    let mut scopes: Vec<PathBuf> = query.search_locations.clone();
    if let Some(base) = &query.base_path {
        scopes.push(base.clone());
    }
    let scope_segments = if scopes.is_empty() {
        None
    } else {
        Some(
            scopes
                .iter()
                .map(|p| segments_of(pool, &p.to_string_lossy()))
                .collect(),
        )
    };

    let excluded = IgnorePolicy::new(&query.excluded_paths, &[]);

    Ok(CompiledQuery {
        query,
        text,
        scope_segments,
        excluded,
    })
}

fn segments_of(pool: &StringPool, path: &str) -> Vec<u32> {
    normalize_path(path)
        .split(std::path::MAIN_SEPARATOR)
        .filter(|s| !s.is_empty())
        .filter_map(|s| pool.intern_name(s).ok())
        .collect()
}

/// Result of running a compiled query to completion.
#[derive(Debug)]
pub struct SearchResult {
    pub total: usize,
    pub returned: usize,
    pub elapsed: Duration,
    pub has_more: bool,
    pub files: Vec<EntryRecord>,
}

impl CompiledQuery {
    /// Run the predicate stack over every candidate entry, in the listed
    /// order, stopping as soon as `max_results` is reached (and precisely
    /// reporting whether a further match exists via `has_more`).
    pub fn evaluate(
        &self,
        store: &IndexStore,
        pool: &StringPool,
        stats: &MatcherStats,
        cancel: &CancellationToken,
    ) -> SearchResult {
        let t0 = Instant::now();
        let candidates = self.candidates(store);
        let cap = self.query.max_results.unwrap_or(usize::MAX);

        let mut files = Vec::new();
        let mut has_more = false;
        let mut total = 0usize;
        for id in candidates {
            if cancel.is_cancelled() {
                break;
            }
            let Some(entry) = store.get(id) else { continue };
            if !self.matches(&entry, pool, stats) {
                continue;
            }
            total += 1;
            if files.len() < cap {
                files.push(entry);
            } else {
                has_more = true;
                break;
            }
        }

        SearchResult {
            total,
            returned: files.len(),
            elapsed: t0.elapsed(),
            has_more,
            files,
        }
    }

    /// Distinct candidate ids across every scope. Overlapping
    /// `search_locations`/`base_path` entries (e.g. `/project` and
    /// `/project/src`) would otherwise double-count and double-return
    /// entries under the overlap.
    fn candidates(&self, store: &IndexStore) -> Vec<u32> {
        match &self.scope_segments {
            Some(scopes) => {
                let mut seen = std::collections::HashSet::new();
                for segs in scopes {
                    let ids = if self.query.include_subdirectories {
                        store.trie().entries_under(segs)
                    } else {
                        store.trie().entries_in(segs)
                    };
                    seen.extend(ids);
                }
                seen.into_iter().collect()
            }
            None => store.snapshot().iter().map(|e| e.full_path_id).collect(),
        }
    }

    /// The full, listed-order predicate stack. Kept as a single straight-line
    /// function (no dynamic dispatch) so the hot path stays monomorphic.
    fn matches(&self, entry: &EntryRecord, pool: &StringPool, stats: &MatcherStats) -> bool {
        let q = &self.query;

        // 2. excluded_paths prefix reject (allow-list scoping already applied
        // via `candidates()`, so this only needs the deny-list).
        let full_path = pool.get_path(entry.full_path_id);
        if self.excluded.is_path_excluded(std::path::Path::new(&full_path)) {
            return false;
        }

        // 3. kind
        if entry.is_directory() && !q.include_directories {
            return false;
        }
        if !entry.is_directory() && !q.include_files {
            return false;
        }

        // 4. hidden/system
        if entry.is_hidden() && !q.include_hidden {
            return false;
        }
        if entry.is_system() && !q.include_system {
            return false;
        }

        // 5. extension filter
        if let Some(filter) = &q.extension_filter {
            let wanted = filter.trim_start_matches('.').to_lowercase();
            let actual = pool.get_name(entry.ext_id).to_lowercase();
            if actual != wanted {
                return false;
            }
        }

        // 6. size range
        if let Some(min) = q.size_min {
            if entry.size < min {
                return false;
            }
        }
        if let Some(max) = q.size_max {
            if entry.size > max {
                return false;
            }
        }

        // 7. date ranges
        if let Some(after) = q.created_after {
            if entry.created_utc < after {
                return false;
            }
        }
        if let Some(before) = q.created_before {
            if entry.created_utc > before {
                return false;
            }
        }
        if let Some(after) = q.modified_after {
            if entry.modified_utc < after {
                return false;
            }
        }
        if let Some(before) = q.modified_before {
            if entry.modified_utc > before {
                return false;
            }
        }

        // 8. required/excluded attribute masks
        if !entry.attributes.contains(q.required_attributes) {
            return false;
        }
        if entry.attributes.intersects(q.excluded_attributes) {
            return false;
        }

        // 9. text predicate, name-only or full-path per `name_only`
        let haystack = if q.name_only {
            pool.get_name(entry.name_id)
        } else {
            full_path.clone()
        };
        match &self.text {
            TextPredicate::None => {}
            TextPredicate::Substring(needle) => {
                let found = if q.case_sensitive {
                    haystack.contains(needle.as_str())
                } else {
                    contains_vectorized(&haystack, needle, stats)
                };
                if !found {
                    return false;
                }
            }
            TextPredicate::Wildcard(pattern) => {
                if q.case_sensitive {
                    if !wildcard_case_sensitive(&haystack, pattern) {
                        return false;
                    }
                } else if !matches_wildcard(&haystack, pattern) {
                    return false;
                }
            }
            TextPredicate::Regex(re) => {
                if !re.is_match(&haystack) {
                    return false;
                }
            }
        }

        true
    }
}

fn wildcard_case_sensitive(text: &str, pattern: &str) -> bool {
    // Reuse the case-insensitive two-pointer algorithm but skip its
    // lowercasing by pre-uppercasing both to a sentinel pairing — simplest
    // correct approach is just to compare on the raw strings directly.
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (tn, pn) = (t.len(), p.len());
    let mut ti = 0usize;
    let mut pi = 0usize;
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0usize;
    while ti < tn {
        if pi < pn && (p[pi] == '?' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < pn && p[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star_pi {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < pn && p[pi] == '*' {
        pi += 1;
    }
    pi == pn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryAttributes;

    fn seed(store: &IndexStore, pool: &StringPool, path: &str, is_dir: bool, ext: &str) {
        let full = pool.intern_path(path).unwrap();
        let p = std::path::Path::new(path);
        let name = p.file_name().unwrap().to_string_lossy().to_string();
        let dir = p.parent().unwrap().to_string_lossy().to_string();
        let name_id = pool.intern_name(&name).unwrap();
        let dir_id = pool.intern_path(&dir).unwrap();
        let ext_id = if ext.is_empty() {
            0
        } else {
            pool.intern_name(ext).unwrap()
        };
        let segs: Vec<u32> = dir
            .split(std::path::MAIN_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(|s| pool.intern_name(s).unwrap())
            .collect();
        let attrs = if is_dir {
            EntryAttributes::DIRECTORY
        } else {
            EntryAttributes::empty()
        };
        let entry = EntryRecord::new(full, name_id, dir_id, ext_id, 100, 0, 0, 0, attrs, b'/');
        store.add(pool, &segs, entry);
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let pool = StringPool::new();
        let store = IndexStore::new();
        seed(&store, &pool, "/root/sub/Test-File.txt", false, "txt");
        seed(&store, &pool, "/root/sub/other.txt", false, "txt");

        let query = SearchQuery {
            text: Some("test".to_string()),
            ..Default::default()
        };
        let compiled = compile(query, &pool).unwrap();
        let result = compiled.evaluate(&store, &pool, &MatcherStats::default(), &CancellationToken::new());
        assert_eq!(result.total, 1);
        assert_eq!(result.returned, 1);
    }

    #[test]
    fn extension_filter_restricts_results() {
        let pool = StringPool::new();
        let store = IndexStore::new();
        seed(&store, &pool, "/root/a.cs", false, "cs");
        seed(&store, &pool, "/root/b.txt", false, "txt");

        let query = SearchQuery {
            extension_filter: Some(".cs".to_string()),
            ..Default::default()
        };
        let compiled = compile(query, &pool).unwrap();
        let result = compiled.evaluate(&store, &pool, &MatcherStats::default(), &CancellationToken::new());
        assert_eq!(result.total, 1);
        assert_eq!(pool.get_name(result.files[0].ext_id), "cs");
    }

    #[test]
    fn base_path_without_subdirectories_is_exact_dir() {
        let pool = StringPool::new();
        let store = IndexStore::new();
        seed(&store, &pool, "/root/sub1/a.txt", false, "txt");
        seed(&store, &pool, "/root/sub1/nested/b.txt", false, "txt");

        let query = SearchQuery {
            base_path: Some(PathBuf::from("/root/sub1")),
            include_subdirectories: false,
            ..Default::default()
        };
        let compiled = compile(query, &pool).unwrap();
        let result = compiled.evaluate(&store, &pool, &MatcherStats::default(), &CancellationToken::new());
        assert_eq!(result.total, 1);
    }

    #[test]
    fn contradictory_size_range_rejected_before_iteration() {
        let pool = StringPool::new();
        let query = SearchQuery {
            size_min: Some(100),
            size_max: Some(10),
            ..Default::default()
        };
        assert!(compile(query, &pool).is_err());
    }

    #[test]
    fn max_results_sets_has_more_precisely() {
        let pool = StringPool::new();
        let store = IndexStore::new();
        for i in 0..5 {
            seed(&store, &pool, &format!("/root/file{i}.txt"), false, "txt");
        }
        let query = SearchQuery {
            max_results: Some(3),
            ..Default::default()
        };
        let compiled = compile(query, &pool).unwrap();
        let result = compiled.evaluate(&store, &pool, &MatcherStats::default(), &CancellationToken::new());
        assert_eq!(result.returned, 3);
        assert!(result.has_more);
    }

    #[test]
    fn overlapping_search_locations_do_not_duplicate_matches() {
        let pool = StringPool::new();
        let store = IndexStore::new();
        seed(&store, &pool, "/project/src/main.rs", false, "rs");
        seed(&store, &pool, "/project/readme.txt", false, "txt");

        let query = SearchQuery {
            search_locations: vec![PathBuf::from("/project"), PathBuf::from("/project/src")],
            ..Default::default()
        };
        let compiled = compile(query, &pool).unwrap();
        let result = compiled.evaluate(&store, &pool, &MatcherStats::default(), &CancellationToken::new());
        assert_eq!(result.total, 2);
        assert_eq!(result.returned, 2);
    }
}
