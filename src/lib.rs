//! # submatch - identity-scoped subscription matching
//!
//! Decides whether a just-modified resource satisfies a subscription's
//! criteria, so a notification pipeline knows whether to fire for it.
//!
//! ## Core Concepts
//!
//! - **Subscription**: a stored criteria expression over one resource type
//! - **ModificationEvent**: one committed create, update or delete
//! - **AugmentedCriteria**: the criteria narrowed to the event's resource
//! - **StructuredQuery**: compiled criteria, always carrying an identity
//! - **MatchResult**: the decision plus diagnostics
//!
//! Each match runs in its own read-only unit of work opened at the latest
//! committed version, so it observes the write that triggered it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use submatch::{
//!     DefinitionRegistry, InMemoryResourceStore, MatcherConfig, ModificationEvent, Resource,
//!     ResourceRef, StoreSubscriptionMatcher, Subscription, SubscriptionMatcher,
//! };
//!
//! let store = Arc::new(InMemoryResourceStore::new());
//! let reference = ResourceRef::new("Observation", "123")?;
//! store.put_committed(Resource::new(&reference).with("status", "final"))?;
//!
//! let matcher = StoreSubscriptionMatcher::with_definitions(
//!     store,
//!     Arc::new(DefinitionRegistry::standard()),
//!     &MatcherConfig::default(),
//! )?;
//! let result = matcher.match_event(
//!     &Subscription::new("Observation?status=final"),
//!     &ModificationEvent::updated(&reference),
//! )?;
//! assert!(result.matched);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod event;
pub mod resource;
pub mod subscription;
pub mod value;

// Collaborators
pub mod criteria;
pub mod definition;
pub mod storage;

// Matching
pub mod config;
pub mod matcher;

pub use config::MatcherConfig;
pub use criteria::{CriteriaTranslator, MatchUrlTranslator, StructuredQuery};
pub use definition::{DefinitionRegistry, ResourceDefinition, SearchParam, SearchParamType};
pub use error::{ConfigError, CriteriaError, EventError, MatchError, MatchStage, SubmatchResult};
pub use event::{ModificationEvent, OperationKind};
pub use matcher::{
    AugmentedCriteria, CancelToken, Canceller, DelayStrategy, IdentityFilterBuilder, IsolatedQueryExecutor,
    MatchResult, MatcherKind, StoreSubscriptionMatcher, SubscriptionMatcher,
};
pub use resource::{Resource, ResourceRef};
pub use storage::{
    InMemoryResourceStore, ReadTransaction, ResourceStore, SearchResults, StorageError, StoreStatus,
    WriteTransaction,
};
pub use subscription::{Subscription, SubscriptionId, SubscriptionStatus};
pub use value::Value;
