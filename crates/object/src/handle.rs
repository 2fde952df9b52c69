//! Object handles
//!
//! An [`ObjectHandle`] is one object opened at a chosen age: its kind
//! tag plus a typed attribute map loaded in a single batched read.
//! Writes go through the handle so the schema can reject attributes
//! that are not legal for the kind.

use crate::attrs;
use crate::schema::{KindTag, Schema};
use magpie_core::{
    types::now_micros, AgeSelector, Error, ObjectName, Result, Timestamp, Value,
};
use magpie_store::{AttributeStore, AttributeVersion};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One object opened for reading and writing at a chosen age.
#[derive(Debug)]
pub struct ObjectHandle {
    store: Arc<AttributeStore>,
    schema: Arc<Schema>,
    name: ObjectName,
    kind: KindTag,
    age: AgeSelector,
    // attribute -> versions, newest first, as visible under `age`.
    attributes: BTreeMap<String, Vec<(Value, Timestamp)>>,
}

impl ObjectHandle {
    /// Create a new object of `kind` at `name`.
    ///
    /// Stamps the `type` attribute; re-creating an existing object adds
    /// a new type version (the object's version times).
    pub fn create(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: ObjectName,
        kind: KindTag,
    ) -> Result<Self> {
        if !schema.knows(&kind) {
            return Err(Error::Internal(format!("unknown kind: {kind}")));
        }
        let ts = now_micros();
        store.write(&name, attrs::TYPE, Value::from(kind.as_str()), Some(ts))?;

        let mut attributes = BTreeMap::new();
        attributes.insert(
            attrs::TYPE.to_string(),
            vec![(Value::from(kind.as_str()), ts)],
        );
        Ok(ObjectHandle {
            store,
            schema,
            name,
            kind,
            age: AgeSelector::Newest,
            attributes,
        })
    }

    /// Open `name`, requiring it to be of `expected` kind (or a
    /// descendant).
    ///
    /// One batched read loads every attribute visible under `age`.
    /// `NotFound` if nothing resolves, `WrongKind` if the stored type
    /// does not satisfy `expected`.
    pub fn open(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: &ObjectName,
        expected: &KindTag,
        age: AgeSelector,
    ) -> Result<Self> {
        let handle = Self::open_any(store, schema, name, age)?;
        handle.require_kind(expected)?;
        Ok(handle)
    }

    /// Open `name` discovering its kind at runtime.
    pub fn open_any(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: &ObjectName,
        age: AgeSelector,
    ) -> Result<Self> {
        let mut resolved = store.multi_read(std::slice::from_ref(name), "", age)?;
        let Some((_, versions)) = resolved.pop() else {
            return Err(Error::not_found(name));
        };
        Ok(Self::from_versions(store, schema, name.clone(), age, versions))
    }

    pub(crate) fn from_versions(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: ObjectName,
        age: AgeSelector,
        versions: Vec<AttributeVersion>,
    ) -> Self {
        let mut attributes: BTreeMap<String, Vec<(Value, Timestamp)>> = BTreeMap::new();
        for av in versions {
            attributes
                .entry(av.attribute)
                .or_default()
                .push((av.value, av.timestamp));
        }
        let kind = attributes
            .get(attrs::TYPE)
            .and_then(|v| v.first())
            .and_then(|(value, _)| value.as_str())
            .map(KindTag::new)
            .unwrap_or_else(KindTag::object);
        ObjectHandle {
            store,
            schema,
            name,
            kind,
            age,
            attributes,
        }
    }

    fn require_kind(&self, expected: &KindTag) -> Result<()> {
        if self.schema.is_a(&self.kind, expected) {
            Ok(())
        } else {
            Err(Error::WrongKind {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            })
        }
    }

    /// The object's name.
    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// The kind this handle is currently tagged as.
    pub fn kind(&self) -> &KindTag {
        &self.kind
    }

    /// The age the handle was opened at.
    pub fn age(&self) -> AgeSelector {
        self.age
    }

    /// Newest visible value of `attribute`.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes
            .get(attribute)
            .and_then(|v| v.first())
            .map(|(value, _)| value)
    }

    /// All visible versions of `attribute`, newest first.
    pub fn get_versions(&self, attribute: &str) -> &[(Value, Timestamp)] {
        self.attributes
            .get(attribute)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The object's version times: when its `type` was (re)stamped,
    /// newest first.
    pub fn version_times(&self) -> Vec<Timestamp> {
        self.get_versions(attrs::TYPE)
            .iter()
            .map(|(_, ts)| *ts)
            .collect()
    }

    /// Write one attribute (a new version; history is kept).
    pub fn set(&mut self, attribute: &str, value: Value) -> Result<()> {
        self.set_batch(vec![(attribute.to_string(), value)])
    }

    /// Write several attributes atomically under one timestamp.
    ///
    /// This is the checkpoint primitive the flow runner relies on:
    /// either all the versions land or none do.
    pub fn set_batch(&mut self, writes: Vec<(String, Value)>) -> Result<()> {
        for (attribute, _) in &writes {
            if !self.schema.allows(&self.kind, attribute) {
                return Err(Error::InvalidName(format!(
                    "attribute {attribute:?} not legal for kind {}",
                    self.kind
                )));
            }
        }
        let ts = now_micros();
        self.store.write_batch(&self.name, writes.clone(), Some(ts))?;
        for (attribute, value) in writes {
            self.attributes
                .entry(attribute)
                .or_default()
                .insert(0, (value, ts));
        }
        Ok(())
    }

    /// Reinterpret the handle as a more specific kind.
    ///
    /// Checked re-tag: `target` must descend from the current kind and
    /// every attribute `target` requires must be present. Nothing is
    /// persisted.
    pub fn upgrade(&mut self, target: KindTag) -> Result<()> {
        if !self.schema.knows(&target) {
            return Err(Error::Internal(format!("unknown kind: {target}")));
        }
        if !self.schema.is_a(&target, &self.kind) {
            return Err(Error::WrongKind {
                expected: target.to_string(),
                actual: self.kind.to_string(),
            });
        }
        for required in self.schema.required_attributes(&target) {
            if !self.attributes.contains_key(&required) {
                return Err(Error::WrongKind {
                    expected: target.to_string(),
                    actual: format!("{} (missing {required})", self.kind),
                });
            }
        }
        self.kind = target;
        Ok(())
    }

    pub(crate) fn store(&self) -> &Arc<AttributeStore> {
        &self.store
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

/// Open many names in one batched read, discovering each kind.
///
/// Names that resolve to nothing are skipped; output preserves input
/// order. This is the classification step of recursive listings.
pub fn multi_open(
    store: &Arc<AttributeStore>,
    schema: &Arc<Schema>,
    names: &[ObjectName],
    age: AgeSelector,
) -> Result<Vec<ObjectHandle>> {
    let resolved = store.multi_read(names, "", age)?;
    Ok(resolved
        .into_iter()
        .map(|(name, versions)| {
            ObjectHandle::from_versions(Arc::clone(store), Arc::clone(schema), name, age, versions)
        })
        .collect())
}
