//! Kind schema registry
//!
//! A flat mapping from kind tag to `{parent, legal attributes,
//! required attributes}`. Inherited attributes resolve by walking
//! parent tags; there is exactly one root (`object`). Attribute names
//! ending in `:` declare a prefix family.

use crate::attrs;
use magpie_core::{Error, Result};
use rustc_hash::FxHashMap;

/// Tag identifying a kind in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindTag(String);

impl KindTag {
    /// Wrap a kind tag string.
    pub fn new(tag: impl Into<String>) -> Self {
        KindTag(tag.into())
    }

    /// The hierarchy root.
    pub fn object() -> Self {
        KindTag::new("object")
    }

    /// Chunked byte streams.
    pub fn stream() -> Self {
        KindTag::new("stream")
    }

    /// Objects whose children are discovered by prefix scan.
    pub fn container() -> Self {
        KindTag::new("container")
    }

    /// Durable flow instances.
    pub fn flow() -> Self {
        KindTag::new("flow")
    }

    /// The raw tag string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for KindTag {
    fn from(s: &str) -> Self {
        KindTag::new(s)
    }
}

#[derive(Debug, Clone)]
struct KindSpec {
    parent: Option<KindTag>,
    /// Attributes this kind adds over its parent. A trailing `:` means
    /// a prefix family.
    attributes: Vec<String>,
    /// Attributes that must be present for an upgrade to this kind.
    required: Vec<String>,
}

/// Registry of object kinds.
///
/// Built once at startup; [`Schema::with_builtins`] registers the
/// `object` / `stream` / `container` / `flow` hierarchy and callers may
/// add domain kinds on top before sharing the schema.
#[derive(Debug)]
pub struct Schema {
    kinds: FxHashMap<KindTag, KindSpec>,
}

impl Schema {
    /// Empty schema containing only the root kind.
    pub fn new() -> Self {
        let mut kinds = FxHashMap::default();
        kinds.insert(
            KindTag::object(),
            KindSpec {
                parent: None,
                attributes: vec![attrs::TYPE.to_string(), attrs::STAT.to_string()],
                required: Vec::new(),
            },
        );
        Schema { kinds }
    }

    /// Schema with the built-in kind hierarchy registered.
    pub fn with_builtins() -> Self {
        let mut schema = Schema::new();
        schema
            .register(
                KindTag::stream(),
                KindTag::object(),
                &[
                    attrs::SIZE,
                    attrs::LAST,
                    attrs::CHUNK_SIZE,
                    attrs::CONTENT_PREFIX,
                ],
                &[attrs::SIZE],
            )
            .expect("builtin registration cannot fail");
        schema
            .register(KindTag::container(), KindTag::object(), &[], &[])
            .expect("builtin registration cannot fail");
        schema
            .register(
                KindTag::flow(),
                KindTag::object(),
                &[
                    attrs::FLOW_KIND,
                    attrs::FLOW_STATUS,
                    attrs::FLOW_STATE,
                    attrs::FLOW_PENDING,
                    attrs::FLOW_COLLECTED,
                    attrs::FLOW_RESULT,
                    attrs::FLOW_ERROR,
                    attrs::FLOW_AGENT,
                    attrs::FLOW_ARGS,
                ],
                &[attrs::FLOW_STATUS],
            )
            .expect("builtin registration cannot fail");
        schema
    }

    /// Register a kind under an existing parent.
    ///
    /// Fails on duplicate tags and unknown parents.
    pub fn register(
        &mut self,
        tag: KindTag,
        parent: KindTag,
        attributes: &[&str],
        required: &[&str],
    ) -> Result<()> {
        if self.kinds.contains_key(&tag) {
            return Err(Error::Internal(format!("kind already registered: {tag}")));
        }
        if !self.kinds.contains_key(&parent) {
            return Err(Error::Internal(format!("unknown parent kind: {parent}")));
        }
        self.kinds.insert(
            tag,
            KindSpec {
                parent: Some(parent),
                attributes: attributes.iter().map(|s| s.to_string()).collect(),
                required: required.iter().map(|s| s.to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Whether `tag` is registered.
    pub fn knows(&self, tag: &KindTag) -> bool {
        self.kinds.contains_key(tag)
    }

    /// Whether `tag` equals `ancestor` or descends from it.
    pub fn is_a(&self, tag: &KindTag, ancestor: &KindTag) -> bool {
        let mut current = Some(tag.clone());
        while let Some(t) = current {
            if &t == ancestor {
                return true;
            }
            current = self.kinds.get(&t).and_then(|spec| spec.parent.clone());
        }
        false
    }

    /// Whether `attribute` is legal on `tag` (own or inherited; prefix
    /// families match by prefix).
    pub fn allows(&self, tag: &KindTag, attribute: &str) -> bool {
        let mut current = Some(tag.clone());
        while let Some(t) = current {
            let Some(spec) = self.kinds.get(&t) else {
                return false;
            };
            for legal in &spec.attributes {
                let matched = if legal.ends_with(':') {
                    attribute.starts_with(legal.as_str())
                } else {
                    attribute == legal
                };
                if matched {
                    return true;
                }
            }
            current = spec.parent.clone();
        }
        false
    }

    /// Attributes an object must carry to be opened or upgraded as
    /// `tag` (own and inherited requirements).
    pub fn required_attributes(&self, tag: &KindTag) -> Vec<String> {
        let mut required = Vec::new();
        let mut current = Some(tag.clone());
        while let Some(t) = current {
            let Some(spec) = self.kinds.get(&t) else { break };
            required.extend(spec.required.iter().cloned());
            current = spec.parent.clone();
        }
        required
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema::with_builtins()
    }
}
