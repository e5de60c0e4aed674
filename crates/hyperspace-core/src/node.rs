//! Absolute, '/'-separated node paths.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HyperspaceError;

/// A normalized absolute path into the Hyperspace node tree.
///
/// Normalization strips a trailing slash (except for the root itself) and
/// rejects empty components (`//`), matching `Master::normalize_name` in
/// the source implementation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodePath(String);

impl NodePath {
    /// The root node, which always exists and is never ephemeral.
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Parse and normalize a path, rejecting anything not rooted at `/`.
    ///
    /// # Errors
    ///
    /// Returns [`HyperspaceError::BadPathname`] if the path is empty, does
    /// not start with `/`, or contains an empty component.
    pub fn parse(raw: &str) -> Result<Self, HyperspaceError> {
        if !raw.starts_with('/') {
            return Err(HyperspaceError::BadPathname(raw.to_owned()));
        }
        if raw == "/" {
            return Ok(Self::root());
        }
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        if trimmed.split('/').skip(1).any(str::is_empty) {
            return Err(HyperspaceError::BadPathname(raw.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Whether this is the root node.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The path as a `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The parent path and this node's own name within it.
    ///
    /// Returns `None` for the root, which has no parent.
    #[must_use]
    pub fn split_parent(&self) -> Option<(NodePath, &str)> {
        if self.is_root() {
            return None;
        }
        let idx = self.0.rfind('/').expect("normalized path always has '/'");
        let child_name = &self.0[idx + 1..];
        let parent = if idx == 0 {
            NodePath::root()
        } else {
            NodePath(self.0[..idx].to_owned())
        };
        Some((parent, child_name))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        assert!(NodePath::root().split_parent().is_none());
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let a = NodePath::parse("/test/a/").unwrap();
        let b = NodePath::parse("/test/a").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_component_is_rejected() {
        assert!(NodePath::parse("/test//a").is_err());
    }

    #[test]
    fn relative_path_is_rejected() {
        assert!(NodePath::parse("test/a").is_err());
    }

    #[test]
    fn split_parent_finds_immediate_child() {
        let (parent, name) = NodePath::parse("/test/a/b").unwrap().split_parent().unwrap();
        assert_eq!(parent, NodePath::parse("/test/a").unwrap());
        assert_eq!(name, "b");
    }

    #[test]
    fn split_parent_of_top_level_node_is_root() {
        let (parent, name) = NodePath::parse("/test").unwrap().split_parent().unwrap();
        assert_eq!(parent, NodePath::root());
        assert_eq!(name, "test");
    }
}
