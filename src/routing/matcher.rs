//! Context-path matching.
//!
//! # Design Decisions
//! - Matching is segment-aware: `/api` covers `/api` and `/api/x`, not `/apix`
//! - Path matching is case-sensitive
//! - `/` covers every path

use std::fmt;

/// URL prefix under which requests are considered in scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextPath(String);

/// Error returned for prefixes that are not absolute paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("context path must start with '/' (got '{0}')")]
pub struct InvalidContextPath(pub String);

impl ContextPath {
    /// Parse a context path. A trailing slash is dropped (except for `/`),
    /// and an empty string means `/`.
    pub fn new(path: impl Into<String>) -> Result<Self, InvalidContextPath> {
        let path = path.into();
        if path.is_empty() {
            return Ok(Self::root());
        }
        if !path.starts_with('/') {
            return Err(InvalidContextPath(path));
        }
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            Ok(Self::root())
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns true if `path` lies inside this context path.
    pub fn contains(&self, path: &str) -> bool {
        self.target(path).is_some()
    }

    /// The part of `path` below this context path, always starting with `/`.
    ///
    /// Returns `None` when `path` lies outside the context path.
    pub fn target<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_root() {
            return Some(if path.is_empty() { "/" } else { path });
        }
        let rest = path.strip_prefix(self.0.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

impl Default for ContextPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ContextPath {
    type Err = InvalidContextPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_input() {
        assert_eq!(ContextPath::new("").unwrap().as_str(), "/");
        assert_eq!(ContextPath::new("///").unwrap().as_str(), "/");
        assert_eq!(ContextPath::new("/api/").unwrap().as_str(), "/api");
        assert_eq!(
            ContextPath::new("api"),
            Err(InvalidContextPath("api".to_string()))
        );
    }

    #[test]
    fn root_contains_everything() {
        let ctx = ContextPath::root();
        assert_eq!(ctx.target("/"), Some("/"));
        assert_eq!(ctx.target("/anything/at/all"), Some("/anything/at/all"));
    }

    #[test]
    fn prefix_match_respects_segments() {
        let ctx = ContextPath::new("/api").unwrap();
        assert_eq!(ctx.target("/api"), Some("/"));
        assert_eq!(ctx.target("/api/"), Some("/"));
        assert_eq!(ctx.target("/api/users/1"), Some("/users/1"));
        assert_eq!(ctx.target("/apix"), None);
        assert_eq!(ctx.target("/outside"), None);
        assert!(!ctx.contains("/API/users"));
    }
}
