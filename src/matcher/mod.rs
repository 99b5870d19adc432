//! Subscription matching.
//!
//! `StoreSubscriptionMatcher` decides whether the resource named by a
//! modification event currently satisfies a subscription's criteria:
//!
//! 1. `IdentityFilterBuilder` scopes the criteria to the event's resource
//! 2. a `CriteriaTranslator` compiles them into a `StructuredQuery`
//! 3. `IsolatedQueryExecutor` runs it in a fresh read-only unit of work
//! 4. `evaluate::is_match` reduces the results to a boolean
//!
//! Calls share no mutable state, so one matcher can serve many threads.

/// Cooperative cancellation.
pub mod cancel;
/// Pre-match delay strategy.
pub mod delay;
/// Result evaluation.
pub mod evaluate;
/// Isolated query execution.
pub mod executor;
/// Identity scoping of criteria.
pub mod identity;

pub use cancel::{CancelToken, Canceller};
pub use delay::DelayStrategy;
pub use executor::IsolatedQueryExecutor;
pub use identity::{AugmentedCriteria, IdentityFilterBuilder};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn};

use crate::config::MatcherConfig;
use crate::criteria::{CriteriaTranslator, MatchUrlTranslator};
use crate::definition::DefinitionRegistry;
use crate::error::SubmatchResult;
use crate::event::ModificationEvent;
use crate::storage::ResourceStore;
use crate::subscription::Subscription;

/// Which engine produced a match decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Decided by querying the resource store.
    Store,
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => write!(f, "store"),
        }
    }
}

/// Outcome of one match call.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// True if the resource satisfies the criteria.
    pub matched: bool,
    /// Engine that made the decision.
    pub matcher: MatcherKind,
    /// Rows the scoped query returned (0 or 1).
    pub result_size: usize,
    /// The identity-scoped criteria that were executed.
    pub criteria: Option<String>,
    /// Wall time of the call, delay included.
    pub elapsed: Duration,
    /// Store version the query observed.
    pub snapshot_version: Option<u64>,
}

impl MatchResult {
    /// A bare decision with no diagnostics.
    #[must_use]
    pub const fn from_bool(matched: bool) -> Self {
        Self {
            matched,
            matcher: MatcherKind::Store,
            result_size: if matched { 1 } else { 0 },
            criteria: None,
            elapsed: Duration::ZERO,
            snapshot_version: None,
        }
    }
}

/// Decides whether an event's resource satisfies a subscription.
pub trait SubscriptionMatcher: Send + Sync {
    /// Matches without cancellation.
    ///
    /// # Errors
    /// See `match_event_cancellable`.
    fn match_event(&self, subscription: &Subscription, event: &ModificationEvent) -> SubmatchResult<MatchResult> {
        self.match_event_cancellable(subscription, event, &CancelToken::never())
    }

    /// Matches, giving up with `MatchError::Cancelled` once `cancel` fires.
    ///
    /// # Errors
    /// - `MatchError::InvalidEvent` if the event has no usable identity
    /// - `MatchError::CriteriaValidation` if the criteria do not compile
    /// - `MatchError::QueryExecution` if the store fails
    /// - `MatchError::Cancelled` if cancelled
    fn match_event_cancellable(
        &self,
        subscription: &Subscription,
        event: &ModificationEvent,
        cancel: &CancelToken,
    ) -> SubmatchResult<MatchResult>;
}

/// Matcher that answers by querying a `ResourceStore`.
#[derive(Clone)]
pub struct StoreSubscriptionMatcher {
    translator: Arc<dyn CriteriaTranslator>,
    executor: IsolatedQueryExecutor,
}

impl StoreSubscriptionMatcher {
    /// Creates a matcher over `store` using `translator` for criteria.
    ///
    /// # Errors
    /// `MatchError::Config` if `config` fails validation.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        translator: Arc<dyn CriteriaTranslator>,
        config: &MatcherConfig,
    ) -> SubmatchResult<Self> {
        config.validate()?;
        let delay = config.pre_match_delay();
        if delay.is_enabled() {
            warn!(
                delay_ms = config.pre_match_delay_ms,
                "subscription matcher configured with a pre-match delay"
            );
        }

        Ok(Self {
            translator,
            executor: IsolatedQueryExecutor::new(store, delay),
        })
    }

    /// Creates a matcher using the match-URL translator over `definitions`.
    ///
    /// # Errors
    /// `MatchError::Config` if `config` fails validation.
    pub fn with_definitions(
        store: Arc<dyn ResourceStore>,
        definitions: Arc<DefinitionRegistry>,
        config: &MatcherConfig,
    ) -> SubmatchResult<Self> {
        Self::new(store, Arc::new(MatchUrlTranslator::new(definitions)), config)
    }

    fn run(
        &self,
        subscription: &Subscription,
        event: &ModificationEvent,
        cancel: &CancelToken,
    ) -> SubmatchResult<(AugmentedCriteria, crate::storage::SearchResults)> {
        let augmented = IdentityFilterBuilder::build(subscription, event)?;
        let query = self
            .translator
            .translate(augmented.as_str(), augmented.identity().resource_type())?
            .with_identity(augmented.identity().clone());

        let results = self.executor.execute(query, cancel)?;
        Ok((augmented, results))
    }
}

impl SubscriptionMatcher for StoreSubscriptionMatcher {
    fn match_event_cancellable(
        &self,
        subscription: &Subscription,
        event: &ModificationEvent,
        cancel: &CancelToken,
    ) -> SubmatchResult<MatchResult> {
        let span = debug_span!(
            "subscription_match",
            subscription = %subscription.id,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            operation = %event.operation,
        );
        let _enter = span.enter();

        let started = Instant::now();
        let (augmented, results) = self.run(subscription, event, cancel)?;
        let matched = evaluate::is_match(&results);

        debug!(
            result_size = results.size(),
            matched,
            "subscription check found {} results for query: {}",
            results.size(),
            augmented
        );

        Ok(MatchResult {
            matched,
            matcher: MatcherKind::Store,
            result_size: results.size(),
            criteria: Some(augmented.to_string()),
            elapsed: started.elapsed(),
            snapshot_version: Some(results.snapshot_version()),
        })
    }
}

impl fmt::Debug for StoreSubscriptionMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubscriptionMatcher")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CriteriaError, MatchError};
    use crate::resource::{Resource, ResourceRef};
    use crate::storage::InMemoryResourceStore;

    // Compile-time test: ensure the matcher trait is object-safe
    fn _assert_matcher_object_safe(_: &dyn SubscriptionMatcher) {}

    fn matcher(store: &Arc<InMemoryResourceStore>) -> StoreSubscriptionMatcher {
        StoreSubscriptionMatcher::with_definitions(
            store.clone(),
            Arc::new(DefinitionRegistry::standard()),
            &MatcherConfig::default(),
        )
        .unwrap()
    }

    fn obs(id: &str, status: &str) -> Resource {
        Resource::new(&ResourceRef::new("Observation", id).unwrap()).with("status", status)
    }

    #[test]
    fn from_bool_has_no_diagnostics() {
        let r = MatchResult::from_bool(true);
        assert!(r.matched);
        assert_eq!(r.result_size, 1);
        assert_eq!(r.matcher, MatcherKind::Store);
        assert!(r.criteria.is_none());
        assert!(!MatchResult::from_bool(false).matched);
    }

    #[test]
    fn matches_and_reports_diagnostics() {
        let store = Arc::new(InMemoryResourceStore::new());
        let version = store.put_committed(obs("123", "final")).unwrap();
        let m = matcher(&store);

        let sub = Subscription::new("Observation?status=final");
        let ev = ModificationEvent::updated(&ResourceRef::new("Observation", "123").unwrap());
        let result = m.match_event(&sub, &ev).unwrap();

        assert!(result.matched);
        assert_eq!(result.result_size, 1);
        assert_eq!(
            result.criteria.as_deref(),
            Some("Observation?status=final&_id=Observation/123")
        );
        assert_eq!(result.snapshot_version, Some(version));
    }

    #[test]
    fn other_resources_do_not_leak_into_match() {
        let store = Arc::new(InMemoryResourceStore::new());
        store.put_committed(obs("1", "preliminary")).unwrap();
        store.put_committed(obs("2", "final")).unwrap();
        let m = matcher(&store);

        let sub = Subscription::new("Observation?status=final");
        let ev = ModificationEvent::updated(&ResourceRef::new("Observation", "1").unwrap());
        assert!(!m.match_event(&sub, &ev).unwrap().matched);
    }

    #[test]
    fn criteria_for_another_type_never_match() {
        let store = Arc::new(InMemoryResourceStore::new());
        store.put_committed(obs("1", "final")).unwrap();
        let m = matcher(&store);

        let sub = Subscription::new("Patient?active=true");
        let ev = ModificationEvent::updated(&ResourceRef::new("Observation", "1").unwrap());
        let result = m.match_event(&sub, &ev).unwrap();
        assert!(!result.matched);
    }

    #[test]
    fn translation_errors_surface_as_criteria_validation() {
        let store = Arc::new(InMemoryResourceStore::new());
        let m = matcher(&store);

        let ev = ModificationEvent::updated(&ResourceRef::new("Observation", "1").unwrap());
        let err = m
            .match_event(&Subscription::new("Observation?bogus=1"), &ev)
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::CriteriaValidation(CriteriaError::UnknownParameter { .. })
        ));
        assert_eq!(store.status().unwrap().read_transactions_begun, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let store = Arc::new(InMemoryResourceStore::new());
        let config = MatcherConfig::default().with_pre_match_delay(Duration::from_secs(3600));
        let err = StoreSubscriptionMatcher::with_definitions(
            store,
            Arc::new(DefinitionRegistry::standard()),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, MatchError::Config(_)));
    }

    #[test]
    fn matcher_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreSubscriptionMatcher>();
    }
}
