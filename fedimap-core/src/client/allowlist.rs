// Instances exempt from the personal-instance cutoff.

use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;

/// Predicate deciding whether a small instance may be crawled anyway.
pub trait AllowList: Send + Sync + std::fmt::Debug {
    fn is_allowed(&self, instance: &str) -> bool;
}

/// Fixed set of allow-listed instance names.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowList {
    names: HashSet<String>,
}

impl StaticAllowList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .filter_map(|n| normalize_line(n.as_ref()))
                .collect(),
        }
    }

    /// One name per line; blank lines and `#` comments are ignored.
    pub fn parse(text: &str) -> Self {
        Self::from_names(text.lines())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl AllowList for StaticAllowList {
    fn is_allowed(&self, instance: &str) -> bool {
        self.names.contains(&instance.to_lowercase())
    }
}

fn normalize_line(line: &str) -> Option<String> {
    let name = line.trim();
    if name.is_empty() || name.starts_with('#') {
        return None;
    }
    Some(name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_lowercases_and_skips_comments() {
        let list = StaticAllowList::parse("# exempt\n  Tiny.Example \n\nsolo.social\n");
        assert_eq!(list.len(), 2);
        assert!(list.is_allowed("tiny.example"));
        assert!(list.is_allowed("SOLO.social"));
        assert!(!list.is_allowed("# exempt"));
    }

    #[test]
    fn empty_list_allows_nothing() {
        let list = StaticAllowList::empty();
        assert!(list.is_empty());
        assert!(!list.is_allowed("mastodon.social"));
    }

    #[test]
    fn from_file_reads_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowlist.txt");
        std::fs::write(&path, "a.social\nb.social\n").unwrap();
        let list = StaticAllowList::from_file(&path).unwrap();
        assert!(list.is_allowed("b.social"));
    }

    #[test]
    fn from_missing_file_is_io_error() {
        let err = StaticAllowList::from_file(Path::new("/nonexistent/allow.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
