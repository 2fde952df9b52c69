//! Hierarchical object names
//!
//! An [`ObjectName`] is the store's only indexing key: a slash-delimited
//! path such as `C.4f2a/fs/os/etc/passwd`. Ordering is component-wise
//! lexicographic so that a parent always sorts immediately before its
//! descendants and prefix-range scans are well defined.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hierarchical path uniquely identifying a store object.
///
/// Names are immutable once built. Components are non-empty and may not
/// contain `/`. The empty name is the root; it is a valid scan prefix
/// but not a valid subject.
///
/// # Examples
///
/// ```
/// use magpie_core::ObjectName;
///
/// let name = ObjectName::parse("agent-1/fs/os")?;
/// assert_eq!(name.basename(), Some("os"));
/// assert_eq!(name.parent().unwrap().to_string(), "agent-1/fs");
/// # Ok::<(), magpie_core::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName {
    components: Vec<String>,
}

impl ObjectName {
    /// The root name (no components).
    pub fn root() -> Self {
        ObjectName { components: Vec::new() }
    }

    /// Parse a slash-delimited path.
    ///
    /// Leading and trailing slashes are tolerated; empty components are
    /// rejected. `""` and `"/"` parse to the root.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut components = Vec::new();
        for part in trimmed.split('/') {
            if part.is_empty() {
                return Err(Error::InvalidName(format!(
                    "empty component in path: {path:?}"
                )));
            }
            components.push(part.to_string());
        }
        Ok(ObjectName { components })
    }

    /// Append a single component.
    pub fn child(&self, component: impl Into<String>) -> Result<Self> {
        let component = component.into();
        if component.is_empty() || component.contains('/') {
            return Err(Error::InvalidName(format!(
                "invalid component: {component:?}"
            )));
        }
        let mut components = self.components.clone();
        components.push(component);
        Ok(ObjectName { components })
    }

    /// Append a relative path (may itself contain slashes).
    pub fn join(&self, relative: &str) -> Result<Self> {
        let suffix = ObjectName::parse(relative)?;
        let mut components = self.components.clone();
        components.extend(suffix.components);
        Ok(ObjectName { components })
    }

    /// The name with the last component removed; `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            return None;
        }
        Some(ObjectName {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// The last path component; `None` at the root.
    pub fn basename(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Path components, root to leaf.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// True for the root name.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether `prefix` is this name or an ancestor of it.
    pub fn starts_with(&self, prefix: &ObjectName) -> bool {
        self.components.len() >= prefix.components.len()
            && self.components[..prefix.components.len()] == prefix.components[..]
    }

    /// The path below `prefix`, as components. `None` if not a descendant.
    pub fn relative_to(&self, prefix: &ObjectName) -> Option<&[String]> {
        if self.starts_with(prefix) {
            Some(&self.components[prefix.components.len()..])
        } else {
            None
        }
    }

    /// True if `child` is an immediate child of this name.
    pub fn is_parent_of(&self, child: &ObjectName) -> bool {
        child.depth() == self.depth() + 1 && child.starts_with(self)
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl std::str::FromStr for ObjectName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectName::parse(s)
    }
}

impl TryFrom<String> for ObjectName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        ObjectName::parse(&s)
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> String {
        name.to_string()
    }
}

// Component-wise ordering so a name always sorts before its
// descendants and range scans over a prefix are contiguous.
impl Ord for ObjectName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for ObjectName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_and_display() {
        let name = ObjectName::parse("a/b/c").unwrap();
        assert_eq!(name.to_string(), "a/b/c");
        assert_eq!(name.depth(), 3);
    }

    #[test]
    fn test_parse_tolerates_outer_slashes() {
        let name = ObjectName::parse("/a/b/").unwrap();
        assert_eq!(name.to_string(), "a/b");
    }

    #[test]
    fn test_parse_rejects_empty_component() {
        assert!(ObjectName::parse("a//b").is_err());
    }

    #[test]
    fn test_root() {
        let root = ObjectName::parse("/").unwrap();
        assert!(root.is_root());
        assert_eq!(root, ObjectName::root());
        assert_eq!(root.basename(), None);
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_child_and_join() {
        let base = ObjectName::parse("agent-1").unwrap();
        let child = base.child("fs").unwrap();
        assert_eq!(child.to_string(), "agent-1/fs");

        let joined = base.join("fs/os/etc").unwrap();
        assert_eq!(joined.to_string(), "agent-1/fs/os/etc");
    }

    #[test]
    fn test_child_rejects_slash() {
        let base = ObjectName::parse("agent-1").unwrap();
        assert!(base.child("a/b").is_err());
        assert!(base.child("").is_err());
    }

    #[test]
    fn test_parent_basename() {
        let name = ObjectName::parse("a/b/c").unwrap();
        assert_eq!(name.basename(), Some("c"));
        assert_eq!(name.parent().unwrap().to_string(), "a/b");
    }

    #[test]
    fn test_starts_with_and_relative() {
        let prefix = ObjectName::parse("a/b").unwrap();
        let name = ObjectName::parse("a/b/c/d").unwrap();
        let other = ObjectName::parse("a/bc").unwrap();

        assert!(name.starts_with(&prefix));
        assert!(!other.starts_with(&prefix), "a/bc is not under a/b");
        assert_eq!(
            name.relative_to(&prefix).unwrap(),
            &["c".to_string(), "d".to_string()]
        );
        assert_eq!(other.relative_to(&prefix), None);
    }

    #[test]
    fn test_is_parent_of() {
        let parent = ObjectName::parse("a/b").unwrap();
        let child = ObjectName::parse("a/b/c").unwrap();
        let grandchild = ObjectName::parse("a/b/c/d").unwrap();

        assert!(parent.is_parent_of(&child));
        assert!(!parent.is_parent_of(&grandchild));
        assert!(!parent.is_parent_of(&parent));
    }

    #[test]
    fn test_ordering_parent_before_descendants() {
        let parent = ObjectName::parse("a/b").unwrap();
        let child = ObjectName::parse("a/b/c").unwrap();
        let sibling = ObjectName::parse("a/c").unwrap();

        assert!(parent < child);
        assert!(child < sibling, "descendants sort before the next sibling");
    }

    #[test]
    fn test_serde_as_string() {
        let name = ObjectName::parse("a/b/c").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"a/b/c\"");
        let back: ObjectName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    fn component() -> impl Strategy<Value = String> {
        "[a-z0-9._-]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_roundtrip_through_display(parts in prop::collection::vec(component(), 1..6)) {
            let path = parts.join("/");
            let name = ObjectName::parse(&path).unwrap();
            let back = ObjectName::parse(&name.to_string()).unwrap();
            prop_assert_eq!(name, back);
        }

        #[test]
        fn prop_descendants_are_contiguous(
            parts in prop::collection::vec(component(), 1..4),
            extra in prop::collection::vec(component(), 1..3),
            other in prop::collection::vec(component(), 1..4),
        ) {
            let prefix = ObjectName::parse(&parts.join("/")).unwrap();
            let descendant = prefix.join(&extra.join("/")).unwrap();
            let unrelated = ObjectName::parse(&other.join("/")).unwrap();

            prop_assert!(descendant.starts_with(&prefix));
            // Component-wise ordering: anything between prefix and a
            // descendant is itself under the prefix.
            if prefix < unrelated && unrelated < descendant {
                prop_assert!(unrelated.starts_with(&prefix));
            }
        }
    }
}
