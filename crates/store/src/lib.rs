//! Versioned attribute store
//!
//! The storage substrate everything else sits on: subjects addressed by
//! [`ObjectName`], each holding named attributes whose values are
//! append-only version histories. No domain knowledge lives here; the
//! typed object layer interprets what the attributes mean.
//!
//! # Design
//!
//! - DashMap sharded by the first path component: agents never contend
//!   with each other
//! - BTreeMap of subjects within a shard: ordered prefix-range scans
//! - Append-only version vectors per attribute: plain writes never
//!   overwrite or delete
//! - Per-name leases with TTL steal for read-modify-write callers
//!
//! [`ObjectName`]: magpie_core::ObjectName

#![warn(missing_docs)]

mod lease;
mod store;

pub use lease::{LeaseMap, SubjectLease};
pub use store::{AttributeStore, AttributeVersion, VersionedValue};
