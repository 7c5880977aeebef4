// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! [`ThreadId`] — the dot-separated hierarchical thread identifier (spec §3).
//!
//! A root id (e.g. a session id) has no dots. Each child thread appends a
//! single numeric segment: `root.1`, `root.1.2`, etc. The hierarchy is a
//! tree, never reparented, so `parent()` is a pure string operation.

use std::fmt;

use crate::error::{MemoryError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Wrap a root thread id (session id). Must be non-empty and contain no
    /// dots — dots are reserved for the hierarchy separator.
    pub fn root(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.contains('.') {
            return Err(MemoryError::InvalidThreadId(id));
        }
        Ok(Self(id))
    }

    /// Wrap an already-formatted thread id without validating hierarchy
    /// shape (used when round-tripping ids read back from storage).
    pub fn from_raw(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.starts_with('.') || id.ends_with('.') || id.contains("..") {
            return Err(MemoryError::InvalidThreadId(id));
        }
        Ok(Self(id))
    }

    /// The child id `self.n`.
    pub fn child(&self, n: u64) -> Self {
        Self(format!("{}.{n}", self.0))
    }

    /// `true` if this id has no parent segment (a session root).
    pub fn is_root(&self) -> bool {
        !self.0.contains('.')
    }

    /// The immediate parent id, or `None` if this is already a root.
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('.').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// The root id at the top of this thread's hierarchy.
    pub fn root_id(&self) -> Self {
        match self.0.split_once('.') {
            Some((root, _)) => Self(root.to_string()),
            None => self.clone(),
        }
    }

    /// `true` if `other` is this id or a descendant of it.
    pub fn is_ancestor_of_or_eq(&self, other: &ThreadId) -> bool {
        other.0 == self.0 || other.0.starts_with(&format!("{}.", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ThreadId {
    type Err = MemoryError;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_raw(s)
    }
}

impl AsRef<str> for ThreadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_rejects_dotted_id() {
        assert!(ThreadId::root("a.b").is_err());
    }

    #[test]
    fn root_rejects_empty() {
        assert!(ThreadId::root("").is_err());
    }

    #[test]
    fn child_appends_segment() {
        let root = ThreadId::root("sess1").unwrap();
        assert_eq!(root.child(1).as_str(), "sess1.1");
        assert_eq!(root.child(1).child(2).as_str(), "sess1.1.2");
    }

    #[test]
    fn is_root_true_only_without_dots() {
        let root = ThreadId::root("sess1").unwrap();
        assert!(root.is_root());
        assert!(!root.child(1).is_root());
    }

    #[test]
    fn parent_of_root_is_none() {
        let root = ThreadId::root("sess1").unwrap();
        assert!(root.parent().is_none());
    }

    #[test]
    fn parent_of_child_strips_last_segment() {
        let child = ThreadId::root("sess1").unwrap().child(1).child(2);
        assert_eq!(child.parent().unwrap().as_str(), "sess1.1");
    }

    #[test]
    fn root_id_of_deep_child_is_the_session_id() {
        let child = ThreadId::root("sess1").unwrap().child(1).child(9);
        assert_eq!(child.root_id().as_str(), "sess1");
    }

    #[test]
    fn is_ancestor_of_or_eq_covers_self_and_descendants() {
        let root = ThreadId::root("sess1").unwrap();
        let child = root.child(1);
        let grandchild = child.child(2);
        assert!(root.is_ancestor_of_or_eq(&root));
        assert!(root.is_ancestor_of_or_eq(&child));
        assert!(root.is_ancestor_of_or_eq(&grandchild));
        assert!(!child.is_ancestor_of_or_eq(&root));
    }

    #[test]
    fn is_ancestor_of_or_eq_does_not_match_sibling_prefix() {
        // "sess1" must not consider "sess10.1" a descendant.
        let root = ThreadId::root("sess1").unwrap();
        let other = ThreadId::from_raw("sess10.1").unwrap();
        assert!(!root.is_ancestor_of_or_eq(&other));
    }

    #[test]
    fn from_raw_rejects_leading_trailing_or_doubled_dots() {
        assert!(ThreadId::from_raw(".a").is_err());
        assert!(ThreadId::from_raw("a.").is_err());
        assert!(ThreadId::from_raw("a..b").is_err());
    }
}
