//! Storage traits and the in-memory backend.
//!
//! The traits define the unit-of-work contract the matcher depends on.
//! `InMemoryResourceStore` implements them for embedded use and tests.

mod memory;
mod traits;

pub use memory::InMemoryResourceStore;
pub use traits::{
    ReadTransaction, ResourceStore, SearchResults, StorageError, StoreStatus, WriteTransaction,
};
