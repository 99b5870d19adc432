//! Isolated query execution.
//!
//! Every call opens its own read-only unit of work at the latest committed
//! version and releases it on every exit path. Nothing is inherited from a
//! transaction the caller may already hold.

use std::sync::Arc;

use tracing::trace;

use crate::criteria::StructuredQuery;
use crate::error::{MatchError, MatchStage, SubmatchResult};
use crate::storage::{ReadTransaction, ResourceStore, SearchResults};

use super::cancel::CancelToken;
use super::delay::DelayStrategy;

/// A read-only unit of work, released when dropped.
struct UnitOfWork<'a> {
    tx: Box<dyn ReadTransaction + 'a>,
}

impl<'a> UnitOfWork<'a> {
    fn begin(store: &'a dyn ResourceStore) -> SubmatchResult<Self> {
        let tx = store.begin_read_only()?;
        trace!(version = tx.version(), "match unit of work opened");
        Ok(Self { tx })
    }

    fn search(&self, query: &StructuredQuery) -> SubmatchResult<SearchResults> {
        Ok(self.tx.search(query)?)
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        trace!(version = self.tx.version(), "match unit of work released");
    }
}

/// Runs identity-scoped queries in a fresh unit of work.
#[derive(Clone)]
pub struct IsolatedQueryExecutor {
    store: Arc<dyn ResourceStore>,
    delay: DelayStrategy,
}

impl IsolatedQueryExecutor {
    /// An existence check never needs more than one row.
    pub const FETCH_LIMIT: usize = 1;

    /// Creates an executor that waits out `delay` before each query.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, delay: DelayStrategy) -> Self {
        Self { store, delay }
    }

    /// Executes `query`, fetching at most one result.
    ///
    /// # Errors
    /// - `MatchError::Internal` if the query carries no identity constraint
    /// - `MatchError::Cancelled` if `cancel` fires at any checkpoint
    /// - `MatchError::QueryExecution` if the store fails
    pub fn execute(&self, query: StructuredQuery, cancel: &CancelToken) -> SubmatchResult<SearchResults> {
        if query.identity().is_none() {
            return Err(MatchError::internal(format!(
                "refusing to run unscoped query against {}",
                query.resource_type()
            )));
        }
        let query = query.with_limit(Self::FETCH_LIMIT);

        self.delay.wait(cancel)?;
        check(cancel)?;

        let uow = UnitOfWork::begin(self.store.as_ref())?;
        let results = uow.search(&query)?;
        drop(uow);

        check(cancel)?;
        Ok(results)
    }
}

impl std::fmt::Debug for IsolatedQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedQueryExecutor")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

fn check(cancel: &CancelToken) -> SubmatchResult<()> {
    if cancel.is_cancelled() {
        Err(MatchError::cancelled(MatchStage::Query))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::criteria::{Condition, Operand, SearchPredicate, Target};
    use crate::resource::{Resource, ResourceRef};
    use crate::storage::{InMemoryResourceStore, StorageError, StoreStatus, WriteTransaction};

    fn final_obs(id: &str) -> Resource {
        Resource::new(&ResourceRef::new("Observation", id).unwrap()).with("status", "final")
    }

    fn scoped(id: &str) -> StructuredQuery {
        let mut q = StructuredQuery::new("Observation");
        q.push(SearchPredicate {
            parameter: "status".to_string(),
            target: Target::Attribute("status".to_string()),
            condition: Condition::AnyOf(vec![Operand::Token("final".to_string())]),
        });
        q.with_identity(ResourceRef::new("Observation", id).unwrap())
    }

    #[test]
    fn executes_in_fresh_unit_and_releases() {
        let store = Arc::new(InMemoryResourceStore::new());
        store.put_committed(final_obs("1")).unwrap();
        let exec = IsolatedQueryExecutor::new(store.clone(), DelayStrategy::None);

        let results = exec.execute(scoped("1"), &CancelToken::never()).unwrap();
        assert_eq!(results.size(), 1);

        let status = store.status().unwrap();
        assert_eq!(status.active_transactions, 0);
        assert_eq!(status.read_transactions_begun, 1);
    }

    /// Records the limit of every query it is asked to run.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryResourceStore,
        limits: Mutex<Vec<Option<usize>>>,
    }

    struct RecordingRead<'a> {
        inner: Box<dyn ReadTransaction + 'a>,
        limits: &'a Mutex<Vec<Option<usize>>>,
    }

    impl ReadTransaction for RecordingRead<'_> {
        fn version(&self) -> u64 {
            self.inner.version()
        }

        fn search(&self, query: &StructuredQuery) -> Result<SearchResults, StorageError> {
            self.limits.lock().unwrap().push(query.limit());
            self.inner.search(query)
        }

        fn read(&self, reference: &ResourceRef) -> Result<Option<Resource>, StorageError> {
            self.inner.read(reference)
        }
    }

    impl ResourceStore for RecordingStore {
        fn begin_read_only(&self) -> Result<Box<dyn ReadTransaction + '_>, StorageError> {
            Ok(Box::new(RecordingRead {
                inner: self.inner.begin_read_only()?,
                limits: &self.limits,
            }))
        }

        fn begin(&self) -> Result<Box<dyn WriteTransaction + '_>, StorageError> {
            self.inner.begin()
        }

        fn status(&self) -> Result<StoreStatus, StorageError> {
            self.inner.status()
        }
    }

    #[test]
    fn caps_limit_to_one() {
        let store = Arc::new(RecordingStore::default());
        store.inner.put_committed(final_obs("1")).unwrap();
        let exec = IsolatedQueryExecutor::new(store.clone(), DelayStrategy::None);

        let results = exec
            .execute(scoped("1").with_limit(50), &CancelToken::never())
            .unwrap();
        assert_eq!(results.size(), 1);
        assert_eq!(*store.limits.lock().unwrap(), vec![Some(IsolatedQueryExecutor::FETCH_LIMIT)]);

        exec.execute(scoped("1"), &CancelToken::never()).unwrap();
        assert_eq!(store.limits.lock().unwrap().last(), Some(&Some(1)));
    }

    #[test]
    fn unbounded_delay_is_cancellable() {
        let store = Arc::new(InMemoryResourceStore::new());
        let exec = IsolatedQueryExecutor::new(store.clone(), DelayStrategy::Fixed(Duration::MAX));
        let (canceller, token) = CancelToken::new();

        let worker = std::thread::spawn(move || exec.execute(scoped("1"), &token));
        std::thread::sleep(Duration::from_millis(20));
        canceller.cancel();

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            MatchError::Cancelled {
                stage: MatchStage::Delay
            }
        ));
        assert_eq!(store.status().unwrap().read_transactions_begun, 0);
    }

    #[test]
    fn rejects_unscoped_query_without_touching_store() {
        let store = Arc::new(InMemoryResourceStore::new());
        let exec = IsolatedQueryExecutor::new(store.clone(), DelayStrategy::None);

        let err = exec
            .execute(StructuredQuery::new("Observation"), &CancelToken::never())
            .unwrap_err();
        assert!(matches!(err, MatchError::Internal { .. }));
        assert_eq!(store.status().unwrap().read_transactions_begun, 0);
    }

    #[test]
    fn pre_cancelled_call_opens_no_unit_of_work() {
        let store = Arc::new(InMemoryResourceStore::new());
        let exec = IsolatedQueryExecutor::new(store.clone(), DelayStrategy::None);
        let (canceller, token) = CancelToken::new();
        canceller.cancel();

        let err = exec.execute(scoped("1"), &token).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(store.status().unwrap().read_transactions_begun, 0);
    }

    struct FailingStore {
        inner: InMemoryResourceStore,
        fail_search: AtomicBool,
    }

    struct FailingRead<'a> {
        inner: Box<dyn ReadTransaction + 'a>,
    }

    impl ReadTransaction for FailingRead<'_> {
        fn version(&self) -> u64 {
            self.inner.version()
        }

        fn search(&self, _query: &StructuredQuery) -> Result<SearchResults, StorageError> {
            Err(StorageError::ConnectionError("store offline".to_string()))
        }

        fn read(&self, reference: &ResourceRef) -> Result<Option<Resource>, StorageError> {
            self.inner.read(reference)
        }
    }

    impl ResourceStore for FailingStore {
        fn begin_read_only(&self) -> Result<Box<dyn ReadTransaction + '_>, StorageError> {
            let inner = self.inner.begin_read_only()?;
            if self.fail_search.load(Ordering::SeqCst) {
                Ok(Box::new(FailingRead { inner }))
            } else {
                Ok(inner)
            }
        }

        fn begin(&self) -> Result<Box<dyn WriteTransaction + '_>, StorageError> {
            self.inner.begin()
        }

        fn status(&self) -> Result<StoreStatus, StorageError> {
            self.inner.status()
        }
    }

    #[test]
    fn store_failure_maps_to_query_execution_and_releases() {
        let store = Arc::new(FailingStore {
            inner: InMemoryResourceStore::new(),
            fail_search: AtomicBool::new(true),
        });
        let exec = IsolatedQueryExecutor::new(store.clone(), DelayStrategy::None);

        let err = exec.execute(scoped("1"), &CancelToken::never()).unwrap_err();
        assert!(err.is_query_execution());
        assert!(err.is_retryable());

        let status = store.status().unwrap();
        assert_eq!(status.active_transactions, 0);
        assert_eq!(status.read_transactions_begun, 1);
    }
}
