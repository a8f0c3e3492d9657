use crate::core::path::normalize_relative;
use crate::error::{Result, SyncError};
use globset::{GlobBuilder, GlobMatcher};

/// 黑名单过滤器
///
/// 含 `/` 的规则匹配完整相对路径，不含 `/` 的规则只匹配最后一段文件名。
/// `*` 和 `?` 不会跨越 `/`。
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<String>,
    matchers: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    full_path: bool,
    matcher: GlobMatcher,
}

impl PathFilter {
    /// 编译规则，任一规则语法错误时失败
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for raw in patterns {
            let p = normalize_pattern(raw.as_ref());
            if p.is_empty() || normalized.contains(&p) {
                continue;
            }
            normalized.push(p);
        }

        let mut matchers = Vec::with_capacity(normalized.len());
        for pattern in &normalized {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
                .map_err(|source| SyncError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            matchers.push(Rule {
                full_path: pattern.contains('/'),
                matcher: glob.compile_matcher(),
            });
        }

        Ok(Self {
            patterns: normalized,
            matchers,
        })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// 相对路径是否命中任一规则
    pub fn is_match(&self, rel_path: &str) -> bool {
        if self.matchers.is_empty() {
            return false;
        }

        let rel_path = normalize_relative(rel_path);
        let base_name = rel_path.rsplit('/').next().unwrap_or_default();
        self.matchers.iter().any(|rule| {
            if rule.full_path {
                rule.matcher.is_match(&rel_path)
            } else {
                rule.matcher.is_match(base_name)
            }
        })
    }
}

fn normalize_pattern(p: &str) -> String {
    let p = p.trim().replace('\\', "/");
    let p = p.strip_prefix("./").unwrap_or(&p);
    let p = p.strip_prefix('/').unwrap_or(p);
    p.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PathFilter {
        PathFilter::new(["*.tmp", "cache/*", "sub/ignore.txt", "node_modules"]).unwrap()
    }

    #[test]
    fn test_blacklist_scenario() {
        let f = filter();
        assert!(f.is_match("a.tmp"));
        assert!(f.is_match("cache/a.txt"));
        assert!(f.is_match("sub/ignore.txt"));
        assert!(f.is_match("dir/node_modules"));
        assert!(!f.is_match("cache/sub/a.txt"));
        assert!(!f.is_match("keep.txt"));
    }

    #[test]
    fn test_empty_filter_never_matches() {
        let f = PathFilter::new(Vec::<String>::new()).unwrap();
        assert!(f.is_empty());
        assert!(!f.is_match("anything"));
        assert!(!f.is_match(""));
        assert!(!PathFilter::default().is_match("a.tmp"));
    }

    #[test]
    fn test_full_path_rule_ignores_basename() {
        let f = PathFilter::new(["sub/ignore.txt"]).unwrap();
        assert!(!f.is_match("ignore.txt"));
        assert!(!f.is_match("other/ignore.txt"));

        let f = PathFilter::new(["sub"]).unwrap();
        assert!(f.is_match("a/sub"));
        assert!(!f.is_match("sub/file.txt"));
    }

    #[test]
    fn test_patterns_are_normalized_and_deduplicated() {
        let f = PathFilter::new([" ./*.tmp ", "/*.tmp", "cache\\*", "", "*.log"]).unwrap();
        assert_eq!(f.patterns(), &["*.tmp", "cache/*", "*.log"]);
        assert_eq!(f.len(), 3);
        assert!(f.is_match("./cache/x"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathFilter::new(["*.tmp", "[abc"]).unwrap_err();
        match err {
            SyncError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "[abc"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
