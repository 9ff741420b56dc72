//! Request paths that bypass session handling entirely.

use regex::Regex;

use crate::session::config::ConfigError;

/// A single exemption entry
#[derive(Debug, Clone)]
pub enum IgnorePath {
    /// Matches when the request path is exactly this string
    ///
    /// The path excludes the query string, so `/foo` also covers `/foo?x=1`.
    Literal(String),
    /// Matches when the pattern is found anywhere in the request path (no query string)
    Pattern(Regex),
}

impl IgnorePath {
    /// Compile `pattern` into a [`IgnorePath::Pattern`]
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == path,
            Self::Pattern(pattern) => pattern.is_match(path),
        }
    }
}

impl From<&str> for IgnorePath {
    fn from(literal: &str) -> Self {
        Self::Literal(literal.to_string())
    }
}

impl From<Regex> for IgnorePath {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

/// Ordered list of exemption entries
#[derive(Debug, Clone, Default)]
pub struct IgnorePaths(Vec<IgnorePath>);

impl IgnorePaths {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    #[must_use]
    pub fn with(mut self, entry: impl Into<IgnorePath>) -> Self {
        self.0.push(entry.into());
        self
    }

    /// Whether `path` is exempt from session handling
    #[must_use]
    pub fn should_ignore(&self, path: &str) -> bool {
        self.0.iter().any(|entry| entry.matches(path))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<IgnorePath> for IgnorePaths {
    fn from_iter<I: IntoIterator<Item = IgnorePath>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_exact() {
        let paths = IgnorePaths::new().with("/foo");
        assert!(paths.should_ignore("/foo"));
        assert!(!paths.should_ignore("/foo/bar"));
        assert!(!paths.should_ignore("/fo"));
    }

    #[test]
    fn test_pattern_is_unanchored() {
        let paths = IgnorePaths::new().with(IgnorePath::pattern(r"/foo").unwrap());
        assert!(paths.should_ignore("/foo"));
        assert!(paths.should_ignore("/api/foo/bar"));
        assert!(!paths.should_ignore("/bar"));
    }

    #[test]
    fn test_mixed_entries() {
        let paths: IgnorePaths = vec![
            IgnorePath::pattern(r"^/bar").unwrap(),
            IgnorePath::from("/foo"),
        ]
        .into_iter()
        .collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.should_ignore("/foo"));
        assert!(paths.should_ignore("/bar/baz"));
        assert!(!paths.should_ignore("/"));
    }

    #[test]
    fn test_empty_list_ignores_nothing() {
        let paths = IgnorePaths::default();
        assert!(paths.is_empty());
        assert!(!paths.should_ignore("/"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = IgnorePath::pattern("(unclosed").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPattern { pattern, .. } if pattern == "(unclosed"
        ));
    }
}
