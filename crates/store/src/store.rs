//! The attribute store proper
//!
//! Subjects live in per-agent shards (DashMap keyed by the first path
//! component, so distinct agents never contend);
//! within a shard an ordered map of subjects makes prefix-range scans
//! cheap. Every attribute holds an append-only version vector.
//!
//! Consistency contract: writes to distinct names never conflict; each
//! `write` / `write_batch` call is atomic for its single name; a range
//! scan holds its shard's read lock, so it observes a snapshot no older
//! than scan start. There is no cross-name transaction; callers that
//! need read-modify-write isolation take a [`SubjectLease`] first.

use crate::lease::{LeaseMap, SubjectLease};
use dashmap::DashMap;
use magpie_core::{types::now_micros, AgeSelector, Error, ObjectName, Result, Timestamp, Value};
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::BuildHasherDefault;
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// One version of one attribute value.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    /// The value written.
    pub value: Value,
    /// When it was written (micros since epoch).
    pub timestamp: Timestamp,
}

/// A resolved attribute version, as returned by batched reads.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeVersion {
    /// Attribute name.
    pub attribute: String,
    /// The value written.
    pub value: Value,
    /// When it was written.
    pub timestamp: Timestamp,
}

// Most attributes carry one or two versions; inline them.
type Versions = SmallVec<[VersionedValue; 2]>;

#[derive(Debug, Default)]
struct Subject {
    attributes: BTreeMap<String, Versions>,
}

#[derive(Debug, Default)]
struct Shard {
    subjects: BTreeMap<ObjectName, Subject>,
}

/// In-memory versioned attribute store.
///
/// # Thread safety
///
/// All operations take `&self`. Different agents (first path
/// component) never contend; within one agent, readers share the shard
/// lock and writers serialize on it.
pub struct AttributeStore {
    shards: DashMap<String, RwLock<Shard>, FxBuildHasher>,
    leases: Arc<LeaseMap>,
    // Fault injection for tests: the next N writes fail Unavailable.
    fail_writes: AtomicU32,
}

impl AttributeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        AttributeStore {
            shards: DashMap::with_hasher(FxBuildHasher::default()),
            leases: Arc::new(LeaseMap::new()),
            fail_writes: AtomicU32::new(0),
        }
    }

    fn shard_key(name: &ObjectName) -> Result<&str> {
        name.components()
            .first()
            .map(|s| s.as_str())
            .ok_or_else(|| Error::InvalidName("the root is not a subject".into()))
    }

    fn take_fault(&self) -> Result<()> {
        let armed = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(Error::Unavailable("injected write fault".into()));
        }
        Ok(())
    }

    /// Arm the fault hook: the next `n` writes fail `Unavailable`.
    ///
    /// Test-only in spirit; exists so retry paths can be exercised
    /// without a real flaky backend.
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Append a version of `attribute` on `name`.
    ///
    /// Never overwrites: every write adds to the attribute's history.
    /// `timestamp` defaults to now; explicit values support replaying
    /// data collected in the past.
    pub fn write(
        &self,
        name: &ObjectName,
        attribute: &str,
        value: Value,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        self.write_batch(name, vec![(attribute.to_string(), value)], timestamp)
    }

    /// Append versions of several attributes on one name, atomically.
    ///
    /// This is the checkpoint primitive: all the writes land under one
    /// shard lock, so a concurrent reader sees either none or all of
    /// them. All versions share one timestamp.
    pub fn write_batch(
        &self,
        name: &ObjectName,
        writes: Vec<(String, Value)>,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        let key = Self::shard_key(name)?;
        self.take_fault()?;
        let ts = timestamp.unwrap_or_else(now_micros);

        let shard = self
            .shards
            .entry(key.to_string())
            .or_insert_with(|| RwLock::new(Shard::default()));
        let mut shard = shard.write();
        let subject = shard.subjects.entry(name.clone()).or_default();
        for (attribute, value) in writes {
            tracing::trace!(name = %name, attribute = %attribute, ts, "write");
            subject
                .attributes
                .entry(attribute)
                .or_default()
                .push(VersionedValue {
                    value,
                    timestamp: ts,
                });
        }
        Ok(())
    }

    /// Remove a subject and its whole attribute history.
    ///
    /// Returns false if the subject did not exist. Plain writes never
    /// delete; this is the explicit removal path (tombstone conventions
    /// belong to callers).
    pub fn delete_subject(&self, name: &ObjectName) -> Result<bool> {
        let key = Self::shard_key(name)?;
        let Some(shard) = self.shards.get(key) else {
            return Ok(false);
        };
        let removed = shard.write().subjects.remove(name).is_some();
        if removed {
            tracing::debug!(name = %name, "subject deleted");
        }
        Ok(removed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read versions of one attribute, newest first.
    ///
    /// A name or attribute that does not resolve yields an empty list;
    /// "no data" and "not an object of the kind you wanted" are
    /// distinguished by the typed layer, not here.
    pub fn read(
        &self,
        name: &ObjectName,
        attribute: &str,
        age: AgeSelector,
    ) -> Result<Vec<(Value, Timestamp)>> {
        let key = Self::shard_key(name)?;
        let Some(shard) = self.shards.get(key) else {
            return Ok(Vec::new());
        };
        let shard = shard.read();
        let Some(versions) = shard
            .subjects
            .get(name)
            .and_then(|s| s.attributes.get(attribute))
        else {
            return Ok(Vec::new());
        };
        Ok(select_versions(versions, age))
    }

    /// Batched prefix read across many names.
    ///
    /// For each resolvable name, returns every attribute whose name
    /// starts with `attribute_prefix`, sorted by attribute then newest
    /// first. Names that resolve to nothing are absent from the result
    /// (never a silent partial failure: absence is the report). Output
    /// preserves input name order.
    pub fn multi_read(
        &self,
        names: &[ObjectName],
        attribute_prefix: &str,
        age: AgeSelector,
    ) -> Result<Vec<(ObjectName, Vec<AttributeVersion>)>> {
        let mut results = Vec::new();
        for name in names {
            let key = Self::shard_key(name)?;
            let Some(shard) = self.shards.get(key) else {
                continue;
            };
            let shard = shard.read();
            let Some(subject) = shard.subjects.get(name) else {
                continue;
            };

            let mut attrs = Vec::new();
            for (attribute, versions) in attr_prefix_range(&subject.attributes, attribute_prefix) {
                for (value, timestamp) in select_versions(versions, age) {
                    attrs.push(AttributeVersion {
                        attribute: attribute.clone(),
                        value,
                        timestamp,
                    });
                }
            }
            if !attrs.is_empty() {
                results.push((name.clone(), attrs));
            }
        }
        Ok(results)
    }

    /// Read a contiguous range of attributes on one name.
    ///
    /// Returns every attribute in `[from, to]` (inclusive, by attribute
    /// name order) in one round trip; chunked stream reads use this to
    /// fetch a covering chunk window. Results sorted by
    /// attribute then newest first, like [`multi_read`](Self::multi_read).
    pub fn read_range(
        &self,
        name: &ObjectName,
        from: &str,
        to_inclusive: &str,
        age: AgeSelector,
    ) -> Result<Vec<AttributeVersion>> {
        let key = Self::shard_key(name)?;
        let Some(shard) = self.shards.get(key) else {
            return Ok(Vec::new());
        };
        let shard = shard.read();
        let Some(subject) = shard.subjects.get(name) else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        let bounds = (
            Bound::Included(from.to_string()),
            Bound::Included(to_inclusive.to_string()),
        );
        for (attribute, versions) in subject.attributes.range::<String, _>(bounds) {
            for (value, timestamp) in select_versions(versions, age) {
                results.push(AttributeVersion {
                    attribute: attribute.clone(),
                    value,
                    timestamp,
                });
            }
        }
        Ok(results)
    }

    /// Whether any attribute was ever written on `name`.
    pub fn subject_exists(&self, name: &ObjectName) -> bool {
        let Ok(key) = Self::shard_key(name) else {
            return false;
        };
        self.shards
            .get(key)
            .map(|s| s.read().subjects.contains_key(name))
            .unwrap_or(false)
    }

    // ========================================================================
    // Hierarchy scans
    // ========================================================================

    /// Immediate children of `name`.
    ///
    /// A child is listed if any subject exists at or below it, so a
    /// directory with collected grandchildren shows up even when the
    /// directory subject itself was never written.
    pub fn list_children(&self, name: &ObjectName) -> Result<BTreeSet<ObjectName>> {
        if name.is_root() {
            let mut children = BTreeSet::new();
            for shard in self.shards.iter() {
                if !shard.value().read().subjects.is_empty() {
                    children.insert(ObjectName::root().child(shard.key().clone())?);
                }
            }
            return Ok(children);
        }

        let key = Self::shard_key(name)?;
        let Some(shard) = self.shards.get(key) else {
            return Ok(BTreeSet::new());
        };
        let shard = shard.read();
        let mut children = BTreeSet::new();
        for (subject, _) in shard
            .subjects
            .range((Bound::Excluded(name.clone()), Bound::Unbounded))
            .take_while(|(n, _)| n.starts_with(name))
        {
            if let Some(rel) = subject.relative_to(name) {
                if let Some(first) = rel.first() {
                    children.insert(name.child(first.clone())?);
                }
            }
        }
        Ok(children)
    }

    /// Batched [`list_children`](Self::list_children) over many names.
    pub fn multi_list_children(
        &self,
        names: &[ObjectName],
    ) -> Result<Vec<(ObjectName, BTreeSet<ObjectName>)>> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push((name.clone(), self.list_children(name)?));
        }
        Ok(results)
    }

    /// Every subject at or below `prefix`, in name order.
    pub fn scan_prefix(&self, prefix: &ObjectName) -> Result<Vec<ObjectName>> {
        if prefix.is_root() {
            let mut all = Vec::new();
            for shard in self.shards.iter() {
                all.extend(shard.value().read().subjects.keys().cloned());
            }
            all.sort();
            return Ok(all);
        }

        let key = Self::shard_key(prefix)?;
        let Some(shard) = self.shards.get(key) else {
            return Ok(Vec::new());
        };
        let shard = shard.read();
        Ok(shard
            .subjects
            .range((Bound::Included(prefix.clone()), Bound::Unbounded))
            .take_while(|(n, _)| n.starts_with(prefix))
            .map(|(n, _)| n.clone())
            .collect())
    }

    // ========================================================================
    // Leases
    // ========================================================================

    /// Acquire the per-name lease on `name`.
    ///
    /// Required before any read-modify-write of a subject (the flow
    /// runner's load → step → checkpoint). See [`LeaseMap::try_lease`].
    pub fn try_lease(&self, name: &ObjectName, ttl_micros: i64) -> Result<SubjectLease> {
        self.leases.try_lease(name, ttl_micros)
    }

    /// Whether `name` is currently leased.
    pub fn is_leased(&self, name: &ObjectName) -> bool {
        self.leases.is_leased(name)
    }
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subjects: usize = self
            .shards
            .iter()
            .map(|s| s.value().read().subjects.len())
            .sum();
        f.debug_struct("AttributeStore")
            .field("shards", &self.shards.len())
            .field("subjects", &subjects)
            .finish()
    }
}

/// Versions visible under `age`, newest first.
///
/// Ties on timestamp break toward the later write, so a re-write at
/// the same microsecond still reads back as the newest value.
fn select_versions(versions: &Versions, age: AgeSelector) -> Vec<(Value, Timestamp)> {
    let mut visible: Vec<(usize, &VersionedValue)> = versions
        .iter()
        .enumerate()
        .filter(|(_, v)| age.admits(v.timestamp))
        .collect();
    visible.sort_by(|&(ia, a), &(ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(&ia)));

    let take = match age {
        AgeSelector::Newest | AgeSelector::AtOrBefore(_) => 1,
        AgeSelector::AllTimes => visible.len(),
    };
    visible
        .into_iter()
        .take(take)
        .map(|(_, v)| (v.value.clone(), v.timestamp))
        .collect()
}

fn attr_prefix_range<'a>(
    attributes: &'a BTreeMap<String, Versions>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Versions)> {
    attributes
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(name, _)| name.starts_with(prefix))
}
