//! Containers and recursive stream discovery
//!
//! A container is an object whose children matter more than its
//! attributes. Children come from the store's hierarchy scan, so a
//! directory shows up the moment anything below it is collected, even
//! if the directory object itself was never written.

use crate::handle::{multi_open, ObjectHandle};
use crate::schema::{KindTag, Schema};
use crate::stream::Stream;
use magpie_core::{AgeSelector, ObjectName, Result};
use magpie_store::AttributeStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A directory-like object.
#[derive(Debug)]
pub struct Container {
    handle: ObjectHandle,
}

impl Container {
    /// Create a container at `name`.
    pub fn create(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: ObjectName,
    ) -> Result<Self> {
        let handle = ObjectHandle::create(store, schema, name, KindTag::container())?;
        Ok(Container { handle })
    }

    /// Open an existing container.
    pub fn open(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: &ObjectName,
        age: AgeSelector,
    ) -> Result<Self> {
        let handle = ObjectHandle::open(store, schema, name, &KindTag::container(), age)?;
        Ok(Container { handle })
    }

    /// The container's name.
    pub fn name(&self) -> &ObjectName {
        self.handle.name()
    }

    /// The underlying handle.
    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    /// Immediate children, in name order.
    pub fn children(&self) -> Result<BTreeSet<ObjectName>> {
        self.handle.store().list_children(self.handle.name())
    }
}

/// Collect every stream at or below `roots`.
///
/// Frontier expansion: classify the current names in one batched open,
/// keep the streams, and feed everything else (containers, plain
/// objects, and names that only exist implicitly through their
/// children) into the next round of child listings. Names form a tree,
/// so each round is strictly deeper and the walk terminates.
pub fn walk_streams(
    store: &Arc<AttributeStore>,
    schema: &Arc<Schema>,
    roots: &[ObjectName],
    age: AgeSelector,
) -> Result<Vec<Stream>> {
    let mut streams = Vec::new();
    let mut frontier: Vec<ObjectName> = roots.to_vec();

    while !frontier.is_empty() {
        let handles = multi_open(store, schema, &frontier, age)?;
        let resolved: BTreeSet<ObjectName> =
            handles.iter().map(|h| h.name().clone()).collect();

        let mut expand: Vec<ObjectName> = Vec::new();
        for handle in handles {
            if schema.is_a(handle.kind(), &KindTag::stream()) {
                streams.push(Stream::from_handle(handle)?);
            } else {
                expand.push(handle.name().clone());
            }
        }
        // Implicit directories: listed as children somewhere but never
        // written as subjects themselves.
        for name in &frontier {
            if !resolved.contains(name) {
                expand.push(name.clone());
            }
        }

        let mut next = BTreeSet::new();
        for (_, children) in store.multi_list_children(&expand)? {
            next.extend(children);
        }
        debug!(
            classified = frontier.len(),
            found = streams.len(),
            next = next.len(),
            "stream walk round"
        );
        frontier = next.into_iter().collect();
    }

    streams.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(streams)
}
