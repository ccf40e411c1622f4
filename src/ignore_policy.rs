//! Exclusion policy shared by the Platform Enumerator and the Query
//! Evaluator: `excluded_paths` matches a path either as a prefix or as a
//! bare path segment (e.g. `"node_modules"` excludes every directory named
//! that, anywhere), `excluded_extensions` matches case-insensitively with the
//! leading dot normalized. Standalone and GUI-free, generalized from the
//! prefix/suffix matching the teacher scattered across its query parser and
//! `main.rs`'s ad hoc ignore checks.

use std::path::Path;

/// Names of virtual / pseudo filesystems to skip by name regardless of
/// `include_system` (spec §6). `overlay` is kept as a fallback for container
/// roots rather than excluded outright.
pub const VIRTUAL_FS_NAMES: &[&str] = &[
    "proc",
    "sysfs",
    "tmpfs",
    "devtmpfs",
    "devpts",
    "securityfs",
    "cgroup",
    "cgroup2",
    "pstore",
    "debugfs",
    "hugetlbfs",
    "mqueue",
    "fusectl",
    "configfs",
    "binfmt_misc",
    "autofs",
    "efivarfs",
    "tracefs",
    "bpf",
    "ramfs",
    "rpc_pipefs",
    "nsfs",
];

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct IgnorePolicy {
    excluded_path_prefixes: Vec<String>,
    excluded_segments: Vec<String>,
    excluded_extensions: Vec<String>,
}

impl IgnorePolicy {
    pub fn new(excluded_paths: &[String], excluded_extensions: &[String]) -> Self {
        let mut prefixes = Vec::new();
        let mut segments = Vec::new();
        for raw in excluded_paths {
            let normalized = crate::string_pool::normalize_path(raw);
            if normalized.contains(std::path::MAIN_SEPARATOR) {
                prefixes.push(normalized);
            } else {
                segments.push(normalized);
            }
        }
        IgnorePolicy {
            excluded_path_prefixes: prefixes,
            excluded_segments: segments,
            excluded_extensions: excluded_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
        }
    }

    /// `true` if `path` should be skipped by the enumerator or rejected by
    /// the evaluator's `excluded_paths` predicate.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        let normalized = crate::string_pool::normalize_path(&path.to_string_lossy());
        if self.excluded_path_prefixes.iter().any(|p| {
            normalized == p.as_str()
                || normalized.starts_with(&format!("{p}{}", std::path::MAIN_SEPARATOR))
        }) {
            return true;
        }
        if !self.excluded_segments.is_empty() {
            for component in path.components() {
                let name = component.as_os_str().to_string_lossy().to_lowercase();
                if self.excluded_segments.iter().any(|s| s.as_str() == name) {
                    return true;
                }
            }
        }
        false
    }

    pub fn is_extension_excluded(&self, ext: &str) -> bool {
        if self.excluded_extensions.is_empty() {
            return false;
        }
        let normalized = normalize_extension(ext);
        self.excluded_extensions.iter().any(|e| e == &normalized)
    }

    /// `true` for a directory entry named after a virtual/pseudo filesystem
    /// mount point. Unix-only in practice; harmless no-op elsewhere since
    /// those names never occur.
    pub fn is_virtual_filesystem(name: &str) -> bool {
        VIRTUAL_FS_NAMES.iter().any(|v| v.eq_ignore_ascii_case(name))
    }
}
