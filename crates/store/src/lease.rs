//! Per-name leases
//!
//! A [`SubjectLease`] gives one caller exclusive read-modify-write
//! access to a single name. Leases carry a TTL: a holder that dies
//! without releasing cannot wedge the name forever, the next claimant
//! steals the expired lease. Contention is reported as
//! [`Error::LockContention`], which callers treat as "retry shortly",
//! never as a failure.

use dashmap::DashMap;
use magpie_core::{types::now_micros, Error, ObjectName, Result, Timestamp};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct LeaseEntry {
    token: Uuid,
    expires: Timestamp,
}

/// Shared lease table, one entry per currently-leased name.
#[derive(Debug, Default)]
pub struct LeaseMap {
    entries: DashMap<ObjectName, LeaseEntry>,
}

impl LeaseMap {
    /// Create an empty lease table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the lease on `name` for `ttl_micros`.
    ///
    /// Fails with [`Error::LockContention`] while a live lease is held
    /// by someone else; expired leases are stolen.
    pub fn try_lease(
        self: &Arc<Self>,
        name: &ObjectName,
        ttl_micros: i64,
    ) -> Result<SubjectLease> {
        let now = now_micros();
        let token = Uuid::new_v4();
        let entry = LeaseEntry {
            token,
            expires: now + ttl_micros,
        };

        match self.entries.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut held) => {
                if held.get().expires > now {
                    return Err(Error::LockContention(name.to_string()));
                }
                tracing::debug!(name = %name, "stealing expired lease");
                held.insert(entry);
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }

        Ok(SubjectLease {
            name: name.clone(),
            token,
            map: Arc::clone(self),
        })
    }

    /// Whether `name` currently has a live lease.
    pub fn is_leased(&self, name: &ObjectName) -> bool {
        self.entries
            .get(name)
            .map(|e| e.expires > now_micros())
            .unwrap_or(false)
    }

    fn release(&self, name: &ObjectName, token: Uuid) {
        // Only the holder's token may release: a stolen lease must not
        // be dropped by the previous (expired) holder.
        self.entries.remove_if(name, |_, entry| entry.token == token);
    }
}

/// Exclusive hold on one name; released on drop.
#[derive(Debug)]
pub struct SubjectLease {
    name: ObjectName,
    token: Uuid,
    map: Arc<LeaseMap>,
}

impl SubjectLease {
    /// The leased name.
    pub fn name(&self) -> &ObjectName {
        &self.name
    }
}

impl Drop for SubjectLease {
    fn drop(&mut self) {
        self.map.release(&self.name, self.token);
    }
}
