//! In-memory storage backend.
//!
//! A thread-safe, multi-version store intended for embedded usage, tests,
//! and as a reference implementation of the storage traits. Every commit
//! produces a new store version; a transaction reads the newest entry of
//! each resource at or below the version it began at, so an open snapshot
//! never sees later commits and a new transaction always sees all of them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use crate::criteria::StructuredQuery;
use crate::resource::{Resource, ResourceRef};
use crate::storage::traits::{
    ReadTransaction, ResourceStore, SearchResults, StorageError, StoreStatus, WriteTransaction,
};

type Key = (String, String);

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn key_of(reference: &ResourceRef) -> Key {
    (reference.resource_type().to_string(), reference.id().to_string())
}

#[derive(Debug, Clone)]
struct VersionedEntry {
    version: u64,
    /// `None` is a tombstone.
    resource: Option<Resource>,
}

#[derive(Debug, Default)]
struct StoreState {
    latest_version: u64,
    records: BTreeMap<Key, Vec<VersionedEntry>>,
}

impl StoreState {
    fn visible(&self, key: &Key, version: u64) -> Option<&Resource> {
        visible_in(self.records.get(key)?, version)
    }
}

fn visible_in(entries: &[VersionedEntry], version: u64) -> Option<&Resource> {
    entries
        .iter()
        .rev()
        .find(|e| e.version <= version)
        .and_then(|e| e.resource.as_ref())
}

/// Thread-safe in-memory resource store.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    state: RwLock<StoreState>,
    active: AtomicU64,
    reads_begun: AtomicU64,
}

impl InMemoryResourceStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a single resource in its own transaction.
    pub fn put_committed(&self, resource: Resource) -> Result<u64, StorageError> {
        let mut tx = self.begin()?;
        tx.put(resource)?;
        tx.commit()
    }

    /// Deletes a single resource in its own transaction.
    pub fn delete_committed(&self, reference: &ResourceRef) -> Result<u64, StorageError> {
        let mut tx = self.begin()?;
        tx.delete(reference)?;
        tx.commit()
    }

    fn latest_version(&self) -> Result<u64, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("store.latest_version"))?;
        Ok(state.latest_version)
    }
}

impl ResourceStore for InMemoryResourceStore {
    fn begin_read_only(&self) -> Result<Box<dyn ReadTransaction + '_>, StorageError> {
        let version = self.latest_version()?;
        self.active.fetch_add(1, Ordering::AcqRel);
        self.reads_begun.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(InMemoryReadTransaction { store: self, version }))
    }

    fn begin(&self) -> Result<Box<dyn WriteTransaction + '_>, StorageError> {
        let version = self.latest_version()?;
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(InMemoryWriteTransaction {
            store: self,
            base_version: version,
            writes: BTreeMap::new(),
        }))
    }

    fn status(&self) -> Result<StoreStatus, StorageError> {
        Ok(StoreStatus {
            latest_version: self.latest_version()?,
            active_transactions: self.active.load(Ordering::Acquire),
            read_transactions_begun: self.reads_begun.load(Ordering::Acquire),
        })
    }
}

struct InMemoryReadTransaction<'a> {
    store: &'a InMemoryResourceStore,
    version: u64,
}

impl ReadTransaction for InMemoryReadTransaction<'_> {
    fn version(&self) -> u64 {
        self.version
    }

    fn search(&self, query: &StructuredQuery) -> Result<SearchResults, StorageError> {
        let limit = query.limit().unwrap_or(usize::MAX);
        let state = self.store.state.read().map_err(|_| lock_err("read.search"))?;
        let mut out = Vec::new();

        if limit == 0 {
            return Ok(SearchResults::new(out, self.version));
        }

        // Identity-scoped queries are a point lookup.
        if let Some(identity) = query.identity() {
            if let Some(resource) = state.visible(&key_of(identity), self.version) {
                if query.matches(resource) {
                    out.push(resource.clone());
                }
            }
            return Ok(SearchResults::new(out, self.version));
        }

        let start: Key = (query.resource_type().to_string(), String::new());
        for ((resource_type, _), entries) in state.records.range(start..) {
            if resource_type != query.resource_type() {
                break;
            }
            if let Some(resource) = visible_in(entries, self.version) {
                if query.matches(resource) {
                    out.push(resource.clone());
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }

        Ok(SearchResults::new(out, self.version))
    }

    fn read(&self, reference: &ResourceRef) -> Result<Option<Resource>, StorageError> {
        let state = self.store.state.read().map_err(|_| lock_err("read.read"))?;
        Ok(state.visible(&key_of(reference), self.version).cloned())
    }
}

impl Drop for InMemoryReadTransaction<'_> {
    fn drop(&mut self) {
        self.store.active.fetch_sub(1, Ordering::AcqRel);
    }
}

struct InMemoryWriteTransaction<'a> {
    store: &'a InMemoryResourceStore,
    base_version: u64,
    writes: BTreeMap<Key, (ResourceRef, Option<Resource>)>,
}

impl WriteTransaction for InMemoryWriteTransaction<'_> {
    fn version(&self) -> u64 {
        self.base_version
    }

    fn put(&mut self, resource: Resource) -> Result<(), StorageError> {
        let reference = resource.reference();
        self.writes.insert(key_of(&reference), (reference, Some(resource)));
        Ok(())
    }

    fn delete(&mut self, reference: &ResourceRef) -> Result<(), StorageError> {
        let key = key_of(reference);
        let exists = match self.writes.get(&key) {
            Some((_, pending)) => pending.is_some(),
            None => {
                let state = self.store.state.read().map_err(|_| lock_err("write.delete"))?;
                state.visible(&key, self.base_version).is_some()
            }
        };
        if !exists {
            return Err(StorageError::NotFound(reference.to_unversioned()));
        }
        self.writes.insert(key, (reference.to_unversioned(), None));
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<u64, StorageError> {
        let mut state = self.store.state.write().map_err(|_| lock_err("write.commit"))?;
        if self.writes.is_empty() {
            return Ok(state.latest_version);
        }

        // Optimistic concurrency: fail if anything we wrote changed after we began.
        for (key, (reference, _)) in &self.writes {
            let changed = state
                .records
                .get(key)
                .and_then(|entries| entries.last())
                .is_some_and(|last| last.version > self.base_version);
            if changed {
                return Err(StorageError::Conflict(reference.clone()));
            }
        }

        let version = state.latest_version + 1;
        let now = Utc::now();
        for (key, (_, write)) in std::mem::take(&mut self.writes) {
            let entries = state.records.entry(key).or_default();
            let resource = write.map(|mut r| {
                r.version = entries.len() as u64 + 1;
                r.last_updated = now;
                r
            });
            entries.push(VersionedEntry { version, resource });
        }
        state.latest_version = version;

        Ok(version)
    }

    fn rollback(self: Box<Self>) {}
}

impl Drop for InMemoryWriteTransaction<'_> {
    fn drop(&mut self) {
        self.store.active.fetch_sub(1, Ordering::AcqRel);
    }
}
