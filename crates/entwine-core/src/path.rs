//! Hierarchical Group Paths
//!
//! Groups form a tree rooted at `/`. A `GroupPath` is the normalized absolute
//! path of one group (`/`, `/staff`, `/staff/admins`). Membership in a group
//! requires membership in its parent, so path arithmetic (parent, ancestor
//! chain) is what the hierarchy reconciler drives on.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Error raised when a string is not a valid group path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupPathError {
    /// Path was empty.
    #[error("Group path must not be empty")]
    Empty,

    /// Path did not start with `/`.
    #[error("Group path must be absolute: {0}")]
    NotAbsolute(String),

    /// Path contained an empty segment (`//`, trailing `/`).
    #[error("Group path contains an empty segment: {0}")]
    EmptySegment(String),
}

/// Normalized absolute path of a group in the group tree.
///
/// The root group is `/`; every entity is a member of it. Ordering is
/// lexicographic on the path string, which places parents before their
/// children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupPath(String);

impl GroupPath {
    /// The root group `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize a path string.
    ///
    /// Accepts `/` and `/seg/seg...` forms; rejects empty, relative, and
    /// trailing-slash inputs.
    pub fn parse(raw: &str) -> Result<Self, GroupPathError> {
        if raw.is_empty() {
            return Err(GroupPathError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(GroupPathError::NotAbsolute(raw.to_string()));
        }
        if raw == "/" {
            return Ok(Self::root());
        }
        if raw[1..].split('/').any(str::is_empty) {
            return Err(GroupPathError::EmptySegment(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the root group.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Number of segments below the root (`/` has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0[1..].split('/').count()
        }
    }

    /// The immediate parent, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Proper ancestors from shallowest to deepest, excluding the root and
    /// excluding the path itself.
    ///
    /// `/a/b/c` yields `[/a, /a/b]`; `/a` and `/` yield nothing.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            if p.is_root() {
                break;
            }
            current = p.parent();
            out.push(p);
        }
        out.reverse();
        out
    }

    /// Whether `self` is a proper ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        if self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b'/')
    }
}

impl Display for GroupPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupPath {
    type Err = GroupPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root() {
        let path = GroupPath::parse("/").unwrap();
        assert!(path.is_root());
        assert_eq!(path.depth(), 0);
    }

    #[test]
    fn test_parse_nested_path() {
        let path = GroupPath::parse("/staff/admins").unwrap();
        assert_eq!(path.as_str(), "/staff/admins");
        assert_eq!(path.depth(), 2);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(GroupPath::parse(""), Err(GroupPathError::Empty));
    }

    #[test]
    fn test_parse_rejects_relative() {
        assert!(matches!(
            GroupPath::parse("staff"),
            Err(GroupPathError::NotAbsolute(_))
        ));
    }

    #[test]
    fn test_parse_rejects_trailing_slash() {
        assert!(matches!(
            GroupPath::parse("/staff/"),
            Err(GroupPathError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_parse_rejects_double_slash() {
        assert!(matches!(
            GroupPath::parse("/staff//admins"),
            Err(GroupPathError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_parent_chain() {
        let path = GroupPath::parse("/a/b/c").unwrap();
        let parent = path.parent().unwrap();
        assert_eq!(parent.as_str(), "/a/b");
        assert_eq!(parent.parent().unwrap().as_str(), "/a");
        assert_eq!(parent.parent().unwrap().parent().unwrap().as_str(), "/");
        assert_eq!(GroupPath::root().parent(), None);
    }

    #[test]
    fn test_ancestors_shallow_to_deep() {
        let path = GroupPath::parse("/a/b/c").unwrap();
        let ancestors: Vec<String> = path
            .ancestors()
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert_eq!(ancestors, vec!["/a", "/a/b"]);
    }

    #[test]
    fn test_ancestors_of_top_level_group_is_empty() {
        assert!(GroupPath::parse("/a").unwrap().ancestors().is_empty());
        assert!(GroupPath::root().ancestors().is_empty());
    }

    #[test]
    fn test_is_ancestor_of() {
        let a = GroupPath::parse("/a").unwrap();
        let ab = GroupPath::parse("/a/b").unwrap();
        let abc = GroupPath::parse("/a/b/c").unwrap();
        let axe = GroupPath::parse("/axe").unwrap();

        assert!(GroupPath::root().is_ancestor_of(&a));
        assert!(a.is_ancestor_of(&ab));
        assert!(a.is_ancestor_of(&abc));
        assert!(!ab.is_ancestor_of(&a));
        assert!(!a.is_ancestor_of(&a));
        // prefix of the string, but not of the path
        assert!(!a.is_ancestor_of(&axe));
    }

    #[test]
    fn test_ordering_places_parents_first() {
        let mut paths = vec![
            GroupPath::parse("/a/b").unwrap(),
            GroupPath::parse("/a").unwrap(),
            GroupPath::root(),
        ];
        paths.sort();
        assert_eq!(paths[0].as_str(), "/");
        assert_eq!(paths[1].as_str(), "/a");
        assert_eq!(paths[2].as_str(), "/a/b");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let path = GroupPath::parse("/staff").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/staff\"");
    }
}
