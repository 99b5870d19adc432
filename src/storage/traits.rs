//! Abstract storage traits for submatch.
//!
//! The store is a collaborator: the matcher only needs to open an
//! independent read-only unit of work and run one search in it. Write
//! transactions exist so event producers (and tests) can commit the
//! changes the matcher later observes.
//!
//! # Unit-of-work lifetime
//! Dropping a transaction releases it. A write transaction dropped without
//! `commit` is rolled back.

use thiserror::Error;

use crate::criteria::StructuredQuery;
use crate::resource::{Resource, ResourceRef};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(ResourceRef),

    /// A concurrent transaction committed a conflicting write.
    #[error("Write conflict on {0}")]
    Conflict(ResourceRef),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// True for failures that may clear up on their own (connectivity,
    /// write conflicts).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError(_) | Self::Conflict(_))
    }
}

/// The result handle of a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    resources: Vec<Resource>,
    snapshot_version: u64,
}

impl SearchResults {
    /// Results read at `snapshot_version`.
    #[must_use]
    pub fn new(resources: Vec<Resource>, snapshot_version: u64) -> Self {
        Self {
            resources,
            snapshot_version,
        }
    }

    /// Number of resources returned (bounded by the query limit).
    #[must_use]
    pub fn size(&self) -> usize {
        self.resources.len()
    }

    /// True when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The matching resources.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// The committed version the search observed.
    #[must_use]
    pub const fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }
}

/// Point-in-time store health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    /// Latest committed version.
    pub latest_version: u64,
    /// Transactions begun and not yet released.
    pub active_transactions: u64,
    /// Read-only transactions begun since the store was created.
    pub read_transactions_begun: u64,
}

/// A read-only unit of work over a consistent snapshot.
pub trait ReadTransaction: Send {
    /// The committed version this transaction reads at.
    fn version(&self) -> u64;

    /// Runs a structured query, returning at most `query.limit()` resources.
    fn search(&self, query: &StructuredQuery) -> Result<SearchResults, StorageError>;

    /// Reads one resource by identity.
    fn read(&self, reference: &ResourceRef) -> Result<Option<Resource>, StorageError>;
}

/// A read-write unit of work. Writes become visible on `commit`.
pub trait WriteTransaction: Send {
    /// The committed version this transaction started from.
    fn version(&self) -> u64;

    /// Creates or replaces a resource.
    fn put(&mut self, resource: Resource) -> Result<(), StorageError>;

    /// Deletes a resource. Returns `NotFound` if it does not exist.
    fn delete(&mut self, reference: &ResourceRef) -> Result<(), StorageError>;

    /// Commits all writes atomically, returning the new committed version.
    fn commit(self: Box<Self>) -> Result<u64, StorageError>;

    /// Discards all writes.
    fn rollback(self: Box<Self>);
}

/// A transactional resource store.
///
/// # Safety Considerations
/// - Every `begin*` call must start an independent transaction; nothing is
///   inherited from transactions already open on the calling thread
/// - Implementations should handle concurrent access safely
pub trait ResourceStore: Send + Sync {
    /// Begins a read-only transaction at the latest committed version.
    fn begin_read_only(&self) -> Result<Box<dyn ReadTransaction + '_>, StorageError>;

    /// Begins a read-write transaction.
    fn begin(&self) -> Result<Box<dyn WriteTransaction + '_>, StorageError>;

    /// Returns the store status.
    fn status(&self) -> Result<StoreStatus, StorageError>;
}
