//! Criteria translation: subscription criteria -> structured query.
//!
//! The matcher treats translation as an external service behind the
//! `CriteriaTranslator` trait. `MatchUrlTranslator` is the bundled
//! implementation for match-URL style criteria.

/// Compiled query types and their evaluation.
pub mod query;
/// Match-URL criteria translator.
pub mod translator;

pub use query::{Comparator, Condition, DateRange, Operand, SearchPredicate, StructuredQuery, Target, TextMatch};
pub use translator::MatchUrlTranslator;

use crate::error::CriteriaError;

/// Validates criteria against a resource type and compiles them.
///
/// `resource_type` is the type of the resource under test. It is the query
/// target when the criteria carry no `Type?` prefix of their own.
pub trait CriteriaTranslator: Send + Sync {
    /// Compiles `criteria` into a structured query.
    ///
    /// # Errors
    /// Any `CriteriaError` when the criteria are malformed or reference
    /// parameters the target type does not declare.
    fn translate(&self, criteria: &str, resource_type: &str) -> Result<StructuredQuery, CriteriaError>;
}
