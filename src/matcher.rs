//! SIMD matcher: vectorized case-insensitive substring scan and a
//! wildcard (`*`/`?`) matcher. The vectorized path is an optimization; its
//! result must equal the scalar reference bit-for-bit, which is what the
//! test below checks.

use std::sync::atomic::{AtomicU64, Ordering};

use memchr::memmem;

/// Counters for observability, queried by the orchestrator's statistics.
#[derive(Default)]
pub struct MatcherStats {
    total: AtomicU64,
    simd_path: AtomicU64,
    scalar_path: AtomicU64,
}

impl MatcherStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.simd_path.load(Ordering::Relaxed),
            self.scalar_path.load(Ordering::Relaxed),
        )
    }
}

/// Case-insensitive substring test. Needles of length >= 4 over an all-ASCII
/// haystack/needle pair take the `memchr`-backed (SIMD-accelerated on x86/
/// aarch64) path; everything else — short needles, or anything with non-ASCII
/// bytes — falls back to a scalar lowercase-and-contains comparison.
pub fn contains_vectorized(haystack: &str, needle: &str, stats: &MatcherStats) -> bool {
    stats.total.fetch_add(1, Ordering::Relaxed);
    if needle.is_empty() {
        return true;
    }
    if needle.len() >= 4 && haystack.is_ascii() && needle.is_ascii() {
        stats.simd_path.fetch_add(1, Ordering::Relaxed);
        let lower_haystack = haystack.to_ascii_lowercase();
        let lower_needle = needle.to_ascii_lowercase();
        memmem::find(lower_haystack.as_bytes(), lower_needle.as_bytes()).is_some()
    } else {
        stats.scalar_path.fetch_add(1, Ordering::Relaxed);
        scalar_contains(haystack, needle)
    }
}

/// The reference scalar implementation: Unicode-aware case folding, used both
/// as the fallback and as the correctness oracle in tests.
pub fn scalar_contains(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Wildcard match with `*` (zero or more chars) and `?` (exactly one char),
/// case-insensitive. Two-pointer algorithm with backtracking on `*`,
/// generalized from the teacher's glob matcher.
pub fn matches_wildcard(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
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

    #[test]
    fn wildcard_star_and_question() {
        assert!(matches_wildcard("readme.md", "*.md"));
        assert!(!matches_wildcard("readme.txt", "*.md"));
        assert!(matches_wildcard("a.txt", "?.txt"));
        assert!(!matches_wildcard("ab.txt", "?.txt"));
        assert!(matches_wildcard("test1.md", "t*t?.md"));
        assert!(matches_wildcard("hello", "hello"));
        assert!(!matches_wildcard("helloworld", "hello"));
    }

    #[test]
    fn wildcard_case_insensitive() {
        assert!(matches_wildcard("IMAGE.PNG", "*.png"));
    }

    #[test]
    fn simd_matches_scalar_reference() {
        let stats = MatcherStats::default();
        let cases = [
            ("The Quick Brown Fox", "quick"),
            ("The Quick Brown Fox", "slow"),
            ("문서 스캔 결과", "스캔"),
            ("abc", "ab"),
            ("", "x"),
            ("anything", ""),
        ];
        for (h, n) in cases {
            assert_eq!(
                contains_vectorized(h, n, &stats),
                scalar_contains(h, n),
                "mismatch for {h:?} / {n:?}"
            );
        }
    }

    #[test]
    fn stats_track_paths_taken() {
        let stats = MatcherStats::default();
        contains_vectorized("abcdefgh", "cdef", &stats);
        contains_vectorized("abc", "ab", &stats);
        let (total, simd, scalar) = stats.snapshot();
        assert_eq!(total, 2);
        assert_eq!(simd, 1);
        assert_eq!(scalar, 1);
    }
}
