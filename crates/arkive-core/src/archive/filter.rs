//! Member selection by include/exclude patterns

use glob::{MatchOptions, Pattern};
use tracing::warn;

/// One user pattern, compiled when its glob syntax is valid
#[derive(Debug, Clone)]
struct MemberPattern {
    raw: String,
    glob: Option<Pattern>,
}

impl MemberPattern {
    fn new(raw: &str) -> Self {
        let raw = raw.trim_matches('/').replace('\\', "/");
        let glob = match Pattern::new(&raw) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(pattern = %raw, error = %e, "Invalid glob pattern, using substring matching");
                None
            }
        };
        Self { raw, glob }
    }

    /// Glob match against the path or any of its ancestors, or a literal substring
    fn matches(&self, path: &str) -> bool {
        if self.raw.is_empty() {
            return false;
        }
        if path.contains(&self.raw) {
            return true;
        }
        let Some(glob) = &self.glob else {
            return false;
        };
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        ancestors(path).any(|candidate| glob.matches_with(candidate, options))
    }
}

/// `a/b/c` yields `a/b/c`, `a/b`, `a`
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path), |p| p.rfind('/').map(|i| &p[..i]))
}

/// Decides which archive members an extraction touches
#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    /// A member must match at least one of these (every group must be satisfied)
    required: Vec<Vec<MemberPattern>>,
    exclude: Vec<MemberPattern>,
}

impl MemberFilter {
    /// Filter built from include and exclude patterns; empty lists select everything
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        let mut filter = Self {
            required: Vec::new(),
            exclude: exclude.iter().map(|p| MemberPattern::new(p)).collect(),
        };
        filter.require_any(include);
        filter
    }

    /// Additionally require a match against one of `patterns`
    pub fn require_any(&mut self, patterns: &[String]) {
        if !patterns.is_empty() {
            self.required
                .push(patterns.iter().map(|p| MemberPattern::new(p)).collect());
        }
    }

    /// Whether a member with this `/`-separated path is selected
    pub fn is_selected(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(path)) {
            return false;
        }
        self.required
            .iter()
            .all(|group| group.iter().any(|p| p.matches(path)))
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.exclude.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_selects_everything() {
        let filter = MemberFilter::default();
        assert!(filter.is_empty());
        assert!(filter.is_selected("anything/at/all.txt"));
    }

    #[test]
    fn test_glob_and_prefix_matching() {
        let filter = MemberFilter::new(&strings(&["*.rs", "docs"]), &[]);
        assert!(filter.is_selected("src/main.rs"));
        assert!(filter.is_selected("docs/guide/intro.md"));
        assert!(!filter.is_selected("README.md"));
    }

    #[test]
    fn test_exclusion_wins() {
        let filter = MemberFilter::new(&strings(&["src"]), &strings(&["*.tmp"]));
        assert!(filter.is_selected("src/lib.rs"));
        assert!(!filter.is_selected("src/cache.tmp"));
    }

    #[test]
    fn test_substring_fallback_for_invalid_glob() {
        let filter = MemberFilter::new(&strings(&["[broken"]), &[]);
        assert!(filter.is_selected("dir/[broken].txt"));
        assert!(!filter.is_selected("dir/fine.txt"));
    }

    #[test]
    fn test_required_groups_combine() {
        let mut filter = MemberFilter::new(&strings(&["*.txt"]), &[]);
        filter.require_any(&strings(&["keep"]));
        assert!(filter.is_selected("keep/a.txt"));
        assert!(!filter.is_selected("keep/a.bin"));
        assert!(!filter.is_selected("other/a.txt"));
    }
}
